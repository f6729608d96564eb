//! Power action state machine
//!
//! [`transition`] is pure: it takes the current machine, one event and the
//! authoritative server status, and returns the next machine together with
//! the effects the session must carry out. Nothing here performs I/O.
//!
//! Only one non-kill action may be outstanding. A second stop while a stop
//! is pending escalates to a kill instead of issuing another stop. Kill is
//! accepted in every phase.

use birdactyl_protocol::{PowerAction, ServerStatus};

/// Identifies one dispatched REST request
pub type Ticket = u64;

/// Where the controller is between requests and completions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerPhase {
    Idle,
    Starting { ticket: Ticket },
    Stopping { ticket: Ticket },
    /// Kill issued while a stop is still outstanding
    Escalated { stop: Ticket, kill: Ticket },
    Restarting { ticket: Ticket },
}

impl PowerPhase {
    /// The non-kill action currently outstanding
    pub fn action_in_flight(&self) -> Option<PowerAction> {
        match self {
            PowerPhase::Idle => None,
            PowerPhase::Starting { .. } => Some(PowerAction::Start),
            PowerPhase::Stopping { .. } | PowerPhase::Escalated { .. } => Some(PowerAction::Stop),
            PowerPhase::Restarting { .. } => Some(PowerAction::Restart),
        }
    }

    pub fn is_escalating(&self) -> bool {
        matches!(self, PowerPhase::Escalated { .. })
    }
}

/// Controller state: current phase plus the ticket counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerMachine {
    phase: PowerPhase,
    next_ticket: Ticket,
}

impl PowerMachine {
    pub fn new() -> Self {
        Self {
            phase: PowerPhase::Idle,
            next_ticket: 1,
        }
    }

    pub fn phase(&self) -> PowerPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == PowerPhase::Idle
    }

    /// Project the machine onto a server status for display
    pub fn power_state(&self, status: ServerStatus) -> PowerState {
        PowerState {
            status,
            action_in_flight: self.phase.action_in_flight(),
            is_escalating: self.phase.is_escalating(),
        }
    }

    fn issue(&mut self) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }
}

impl Default for PowerMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the power controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    pub status: ServerStatus,
    pub action_in_flight: Option<PowerAction>,
    pub is_escalating: bool,
}

impl PowerState {
    /// Whether a request for `action` would be accepted right now
    ///
    /// `status` is expected to already reflect suspension.
    pub fn allows(&self, action: PowerAction) -> bool {
        let idle = self.action_in_flight.is_none();
        match action {
            PowerAction::Start => {
                idle && matches!(self.status, ServerStatus::Stopped | ServerStatus::Failed)
            }
            PowerAction::Stop => {
                (idle && self.status == ServerStatus::Running)
                    || (self.action_in_flight == Some(PowerAction::Stop) && !self.is_escalating)
            }
            PowerAction::Restart => idle && self.status == ServerStatus::Running,
            PowerAction::Kill => true,
        }
    }
}

/// Input to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerEvent {
    /// The operator asked for an action
    Requested(PowerAction),
    /// A dispatched REST call finished
    Completed {
        ticket: Ticket,
        action: PowerAction,
        outcome: Result<(), String>,
    },
}

/// Work the session performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerEffect {
    /// Send the REST request for `action`
    Dispatch { ticket: Ticket, action: PowerAction },
    /// Optimistic status after a successful call
    SetStatus(ServerStatus),
    ResetStats,
    MarkStatsUnknown,
    /// Append `[ERROR] <reason>` to the console
    LogError(String),
}

/// Result of a single step
pub type Transition = (PowerMachine, Vec<PowerEffect>);

/// Advance the machine by one event
pub fn transition(machine: &PowerMachine, event: PowerEvent, status: ServerStatus) -> Transition {
    let mut next = machine.clone();
    let effects = match event {
        PowerEvent::Requested(action) => request(&mut next, action, status),
        PowerEvent::Completed {
            ticket,
            action,
            outcome,
        } => complete(&mut next, ticket, action, outcome),
    };
    (next, effects)
}

fn request(machine: &mut PowerMachine, action: PowerAction, status: ServerStatus) -> Vec<PowerEffect> {
    match (action, machine.phase) {
        (PowerAction::Kill, phase) => {
            let ticket = machine.issue();
            match phase {
                PowerPhase::Stopping { ticket: stop } | PowerPhase::Escalated { stop, .. } => {
                    machine.phase = PowerPhase::Escalated { stop, kill: ticket };
                }
                _ => {}
            }
            vec![PowerEffect::Dispatch { ticket, action }]
        }
        (PowerAction::Stop, PowerPhase::Stopping { ticket: stop }) => {
            let kill = machine.issue();
            machine.phase = PowerPhase::Escalated { stop, kill };
            vec![PowerEffect::Dispatch {
                ticket: kill,
                action: PowerAction::Kill,
            }]
        }
        (PowerAction::Start, PowerPhase::Idle)
            if matches!(status, ServerStatus::Stopped | ServerStatus::Failed) =>
        {
            let ticket = machine.issue();
            machine.phase = PowerPhase::Starting { ticket };
            vec![PowerEffect::ResetStats, PowerEffect::Dispatch { ticket, action }]
        }
        (PowerAction::Stop, PowerPhase::Idle) if status == ServerStatus::Running => {
            let ticket = machine.issue();
            machine.phase = PowerPhase::Stopping { ticket };
            vec![PowerEffect::Dispatch { ticket, action }]
        }
        (PowerAction::Restart, PowerPhase::Idle) if status == ServerStatus::Running => {
            let ticket = machine.issue();
            machine.phase = PowerPhase::Restarting { ticket };
            vec![
                PowerEffect::MarkStatsUnknown,
                PowerEffect::Dispatch { ticket, action },
            ]
        }
        _ => Vec::new(),
    }
}

fn complete(
    machine: &mut PowerMachine,
    ticket: Ticket,
    action: PowerAction,
    outcome: Result<(), String>,
) -> Vec<PowerEffect> {
    if action == PowerAction::Kill {
        if let PowerPhase::Escalated { stop, kill } = machine.phase {
            if kill == ticket {
                machine.phase = match outcome {
                    Ok(()) => PowerPhase::Idle,
                    Err(_) => PowerPhase::Stopping { ticket: stop },
                };
            }
        }
        return match outcome {
            Ok(()) => vec![
                PowerEffect::SetStatus(ServerStatus::Stopped),
                PowerEffect::ResetStats,
            ],
            Err(reason) => vec![PowerEffect::LogError(reason)],
        };
    }

    let matches_phase = match machine.phase {
        PowerPhase::Starting { ticket: t } => t == ticket && action == PowerAction::Start,
        PowerPhase::Stopping { ticket: t } | PowerPhase::Escalated { stop: t, .. } => {
            t == ticket && action == PowerAction::Stop
        }
        PowerPhase::Restarting { ticket: t } => t == ticket && action == PowerAction::Restart,
        PowerPhase::Idle => false,
    };
    if !matches_phase {
        return Vec::new();
    }

    machine.phase = PowerPhase::Idle;
    match (action, outcome) {
        (_, Err(reason)) => vec![PowerEffect::LogError(reason)],
        (PowerAction::Stop, Ok(())) => vec![
            PowerEffect::SetStatus(ServerStatus::Stopped),
            PowerEffect::ResetStats,
        ],
        (_, Ok(())) => vec![PowerEffect::SetStatus(ServerStatus::Running)],
    }
}
