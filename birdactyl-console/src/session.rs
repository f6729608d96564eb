//! Console session for one server
//!
//! [`Session`] composes the log buffer, telemetry, command history, power
//! controller and the console channel into the single object the UI talks
//! to. It owns everything it touches and handles one event at a time.

pub mod history;
pub mod log_buffer;
pub mod power;
pub mod stats;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use birdactyl_protocol::{
    permissions, ClientFrame, PowerAction, Server, ServerFrame, ServerId, ServerStatus,
    StatsSnapshot, StatusResponse,
};
use birdactyl_utils::{ConsoleError, Result};

use crate::api::{PanelApi, PermissionOracle, PermissionSet};
use crate::config::ConsoleConfig;
use crate::connection::{
    ConnectOptions, Connection, ConnectionEvent, ConnectionState, ReconnectPolicy,
};

pub use history::{CommandHistory, HistoryDirection, HISTORY_LIMIT};
pub use log_buffer::{LogBuffer, LogLine, LogOrigin};
pub use power::{PowerEffect, PowerEvent, PowerMachine, PowerPhase, PowerState, Ticket};
pub use stats::StatsTracker;
pub use status::StatusView;

/// System line appended after the channel comes back from an outage
pub const GAP_MARKER: &str = "connection restored; output during the outage may be missing";

/// Outcome of a spawned power request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerCompletion {
    pub ticket: Ticket,
    pub action: PowerAction,
    pub outcome: std::result::Result<(), String>,
}

/// Anything the session reacts to, besides user input
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connection(ConnectionEvent),
    Power(PowerCompletion),
}

/// Everything needed to open a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub server_id: ServerId,
    pub panel_url: Url,
    pub token: String,
    pub scrollback_lines: usize,
    pub power_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl SessionOptions {
    pub fn from_config(server_id: ServerId, config: &ConsoleConfig) -> Result<Self> {
        Ok(Self {
            server_id,
            panel_url: config.panel_url()?,
            token: config.token()?.to_string(),
            scrollback_lines: config.console.scrollback_lines,
            power_timeout: config.power_timeout(),
            reconnect: config.reconnect.policy(),
        })
    }
}

pub struct Session {
    server: Server,
    status: StatusView,
    logs: LogBuffer,
    stats: StatsTracker,
    history: CommandHistory,
    power: PowerMachine,
    connection: Connection,
    api: Arc<dyn PanelApi>,
    permissions: Box<dyn PermissionOracle>,
    completions_tx: mpsc::UnboundedSender<PowerCompletion>,
    completions_rx: mpsc::UnboundedReceiver<PowerCompletion>,
    power_timeout: Duration,
    closed: bool,
}

impl Session {
    /// Fetch the server, check access and open the console channel
    pub async fn open(options: SessionOptions, api: Arc<dyn PanelApi>) -> Result<Self> {
        let server_id = options.server_id;
        let server = api.get_server(server_id).await?;
        let granted = PermissionSet::new(api.get_permissions(server_id).await?);
        if !granted.can(permissions::CONSOLE_READ) {
            return Err(ConsoleError::PermissionDenied(format!(
                "{} is required to open the console",
                permissions::CONSOLE_READ
            )));
        }

        let status = match api.get_status(server_id).await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch server status");
                None
            }
        };

        let connection = Connection::open(ConnectOptions {
            panel_url: options.panel_url,
            server_id,
            token: options.token,
            reconnect: options.reconnect,
        })?;

        let mut session = Self::assemble(
            server,
            Box::new(granted),
            api,
            connection,
            options.scrollback_lines,
            options.power_timeout,
        );
        if let Some(status) = status {
            session.seed(status);
        }
        tracing::info!(server = %session.server.name, "Console session opened");
        Ok(session)
    }

    fn assemble(
        server: Server,
        permissions: Box<dyn PermissionOracle>,
        api: Arc<dyn PanelApi>,
        connection: Connection,
        scrollback_lines: usize,
        power_timeout: Duration,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let mut stats = StatsTracker::new();
        if server.status.clears_telemetry() {
            stats.reset();
        }

        Self {
            status: StatusView::new(server.status, server.is_suspended()),
            server,
            logs: LogBuffer::new(scrollback_lines),
            stats,
            history: CommandHistory::new(),
            power: PowerMachine::new(),
            connection,
            api,
            permissions,
            completions_tx,
            completions_rx,
            power_timeout,
            closed: false,
        }
    }

    /// Apply the status snapshot fetched when the session opened
    fn seed(&mut self, response: StatusResponse) {
        self.set_confirmed_status(response.status);
        if let Some(stats) = response.stats {
            if !response.status.clears_telemetry() {
                self.stats.update(stats);
            }
        }
    }

    // === Accessors ===

    /// Server record; its `status` is the last confirmed value
    ///
    /// Use [`Session::status`] for the status to display.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Status to display: optimistic while a power call result is unconfirmed
    pub fn status(&self) -> ServerStatus {
        self.status.effective()
    }

    pub fn status_view(&self) -> &StatusView {
        &self.status
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    /// `None` while no sample is known (for example during a restart)
    pub fn stats(&self) -> Option<&StatsSnapshot> {
        self.stats.snapshot()
    }

    pub fn stats_tracker(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Banner text when the channel is unusable
    pub fn connection_error(&self) -> Option<&str> {
        self.connection.error()
    }

    pub fn power_state(&self) -> PowerState {
        self.power.power_state(self.status.effective())
    }

    pub fn can(&self, permission: &str) -> bool {
        self.permissions.can(permission)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // === Operations ===

    /// Send a console command
    ///
    /// Blank input is ignored without any trace. On success the command is
    /// echoed into the log and remembered in the history.
    pub async fn submit_command(&mut self, raw: &str) -> Result<()> {
        if self.closed {
            return Err(ConsoleError::SessionClosed);
        }
        let Some(frame) = ClientFrame::command(raw) else {
            return Ok(());
        };
        if !self.permissions.can(permissions::CONSOLE_WRITE) {
            self.logs
                .append(LogLine::system("You do not have permission to send commands."));
            return Err(ConsoleError::PermissionDenied(
                permissions::CONSOLE_WRITE.to_string(),
            ));
        }

        let ClientFrame::Command { command } = &frame;
        let command = command.clone();
        self.connection.send(frame).await?;
        self.logs.append(LogLine::echo(&command));
        self.history.push(command);
        Ok(())
    }

    /// Ask for a power transition
    ///
    /// Requests the controller refuses (wrong status, another action in
    /// flight) are silently dropped. Missing permission is reported in the log.
    pub fn request_power_action(&mut self, action: PowerAction) -> Result<()> {
        if self.closed {
            return Err(ConsoleError::SessionClosed);
        }

        // A second stop becomes a kill, so it needs the kill permission.
        let effective = match (action, self.power.phase()) {
            (PowerAction::Stop, PowerPhase::Stopping { .. }) => PowerAction::Kill,
            _ => action,
        };
        let required = effective.permission();
        if !self.permissions.can(required) {
            self.logs.append(LogLine::system(format!(
                "You do not have permission to {} this server.",
                effective
            )));
            return Err(ConsoleError::PermissionDenied(required.to_string()));
        }

        self.step(PowerEvent::Requested(action));
        Ok(())
    }

    /// Recall a previous command for the input line
    pub fn navigate_history(&mut self, direction: HistoryDirection) -> String {
        self.history.navigate(direction)
    }

    /// Wait for the next connection event or power completion
    ///
    /// Returns `None` once the session is closed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if self.closed {
            return None;
        }
        tokio::select! {
            Some(event) = self.connection.recv() => Some(SessionEvent::Connection(event)),
            Some(done) = self.completions_rx.recv() => Some(SessionEvent::Power(done)),
            else => None,
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        if self.closed {
            tracing::debug!(?event, "Session closed, dropping event");
            return;
        }
        match event {
            SessionEvent::Connection(event) => self.handle_connection_event(event),
            SessionEvent::Power(done) => {
                if let Err(reason) = &done.outcome {
                    tracing::warn!(action = %done.action, %reason, "Power action failed");
                }
                self.step(PowerEvent::Completed {
                    ticket: done.ticket,
                    action: done.action,
                    outcome: done.outcome,
                });
            }
        }
    }

    /// Tear down the channel and release all buffers; idempotent
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.connection.close();
        self.completions_rx.close();
        self.logs.clear();
        self.stats = StatsTracker::new();
        self.history = CommandHistory::new();
        tracing::info!(server = %self.server.name, "Console session closed");
    }

    // === Internals ===

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { reconnected } => {
                if reconnected {
                    self.logs.append(LogLine::system(GAP_MARKER));
                }
            }
            ConnectionEvent::Frame(frame) => self.handle_frame(frame),
            ConnectionEvent::Rejected(reason) => {
                tracing::warn!(%reason, "Console rejected");
                self.stats.mark_stale();
            }
            ConnectionEvent::Lost(_) | ConnectionEvent::GaveUp { .. } => {
                self.stats.mark_stale();
            }
            ConnectionEvent::Reconnecting { .. } | ConnectionEvent::Closed => {}
        }
    }

    fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Console {
                line,
                color,
                daemon,
            } => {
                let origin = if daemon {
                    LogOrigin::System
                } else {
                    LogOrigin::Server
                };
                self.logs.append(LogLine::new(line, color, origin));
            }
            ServerFrame::Stats(snapshot) => self.stats.update(snapshot),
            ServerFrame::Status { status } => self.set_confirmed_status(status),
            // Followed by a rejection, which sets the banner.
            ServerFrame::Error { message } => self.logs.append(LogLine::error(message)),
        }
    }

    fn set_confirmed_status(&mut self, status: ServerStatus) {
        let changed = self.status.confirm(status);
        self.server.status = status;
        if changed && status.clears_telemetry() {
            self.stats.reset();
        }
    }

    fn step(&mut self, event: PowerEvent) {
        let (next, effects) = power::transition(&self.power, event, self.status.effective());
        self.power = next;
        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: PowerEffect) {
        match effect {
            PowerEffect::Dispatch { ticket, action } => self.dispatch(ticket, action),
            PowerEffect::SetStatus(status) => {
                self.status.assume(status);
            }
            PowerEffect::ResetStats => self.stats.reset(),
            PowerEffect::MarkStatsUnknown => self.stats.mark_unknown(),
            PowerEffect::LogError(reason) => self.logs.append(LogLine::error(reason)),
        }
    }

    /// Run the REST call on its own task; the result comes back as an event
    fn dispatch(&self, ticket: Ticket, action: PowerAction) {
        let api = Arc::clone(&self.api);
        let tx = self.completions_tx.clone();
        let server_id = self.server.id;
        let deadline = self.power_timeout;

        tracing::info!(%action, ticket, "Dispatching power action");
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(deadline, api.power(server_id, action)).await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.reason()),
                Err(_) => Err(ConsoleError::Timeout {
                    seconds: deadline.as_secs(),
                }
                .to_string()),
            };
            // The session may be gone by now.
            let _ = tx.send(PowerCompletion {
                ticket,
                action,
                outcome,
            });
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;
    use uuid::Uuid;

    const WAIT: Duration = Duration::from_secs(5);

    /// Panel double that records power calls and can hold them open
    struct MockApi {
        calls: Mutex<Vec<PowerAction>>,
        gate: Option<Semaphore>,
        failure: Option<String>,
    }

    impl MockApi {
        fn instant() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                gate: None,
                failure: None,
            })
        }

        fn gated() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                gate: Some(Semaphore::new(0)),
                failure: None,
            })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                gate: None,
                failure: Some(reason.to_string()),
            })
        }

        fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        fn calls(&self) -> Vec<PowerAction> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PanelApi for MockApi {
        async fn power(&self, _server_id: ServerId, action: PowerAction) -> Result<()> {
            self.calls.lock().unwrap().push(action);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            match &self.failure {
                Some(reason) => Err(ConsoleError::Api {
                    status: 500,
                    message: reason.clone(),
                }),
                None => Ok(()),
            }
        }

        async fn get_server(&self, _server_id: ServerId) -> Result<Server> {
            Ok(server(ServerStatus::Running))
        }

        async fn get_permissions(&self, _server_id: ServerId) -> Result<Vec<String>> {
            Ok(vec![permissions::ADMIN.to_string()])
        }

        async fn get_status(&self, _server_id: ServerId) -> Result<StatusResponse> {
            Ok(StatusResponse {
                status: ServerStatus::Running,
                stats: None,
            })
        }
    }

    fn server(status: ServerStatus) -> Server {
        Server {
            id: Uuid::nil(),
            name: "survival".into(),
            description: String::new(),
            status,
            is_suspended: false,
            memory: 1024,
            cpu: 100,
            disk: 4096,
        }
    }

    struct Harness {
        session: Session,
        api: Arc<MockApi>,
        outgoing: mpsc::Receiver<ClientFrame>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    }

    fn harness_with(api: Arc<MockApi>, status: ServerStatus, granted: &[&str]) -> Harness {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let connection = Connection::from_parts(out_tx, ev_rx);
        let permissions = PermissionSet::new(granted.iter().map(|p| p.to_string()).collect());
        let session = Session::assemble(
            server(status),
            Box::new(permissions),
            api.clone(),
            connection,
            100,
            Duration::from_secs(5),
        );
        Harness {
            session,
            api,
            outgoing: out_rx,
            events: ev_tx,
        }
    }

    fn harness(api: Arc<MockApi>, status: ServerStatus) -> Harness {
        harness_with(api, status, &[permissions::ADMIN])
    }

    impl Harness {
        /// Feed a connection event and process it
        async fn feed(&mut self, event: ConnectionEvent) {
            self.events.send(event).unwrap();
            self.pump().await;
        }

        /// Process exactly one pending event
        async fn pump(&mut self) {
            let event = timeout(WAIT, self.session.next_event())
                .await
                .expect("timed out waiting for session event")
                .expect("session produced no event");
            self.session.handle_event(event);
        }

        fn texts(&self) -> Vec<String> {
            self.session.logs().iter().map(|l| l.text.clone()).collect()
        }
    }

    fn console(line: &str) -> ConnectionEvent {
        ConnectionEvent::Frame(ServerFrame::Console {
            line: line.into(),
            color: None,
            daemon: false,
        })
    }

    fn stats_frame(cpu: f64) -> ConnectionEvent {
        ConnectionEvent::Frame(ServerFrame::Stats(StatsSnapshot {
            memory_usage_bytes: 1024,
            memory_limit_bytes: 2048,
            cpu_percent: cpu,
            disk_usage_bytes: 10,
            net_rx_bytes: 1,
            net_tx_bytes: 2,
        }))
    }

    #[tokio::test]
    async fn test_empty_command_is_ignored() {
        let mut h = harness(MockApi::instant(), ServerStatus::Running);
        h.feed(ConnectionEvent::Opened { reconnected: false }).await;

        h.session.submit_command("   ").await.unwrap();
        h.session.submit_command("").await.unwrap();
        assert!(h.session.logs().is_empty());
        assert!(h.outgoing.try_recv().is_err());
        assert!(h.session.history().is_empty());
    }

    #[tokio::test]
    async fn test_submit_requires_open_connection() {
        let mut h = harness(MockApi::instant(), ServerStatus::Running);
        let err = h.session.submit_command("list").await.unwrap_err();
        assert!(matches!(err, ConsoleError::NotConnected));
        assert!(h.session.logs().is_empty());
        assert!(h.session.history().is_empty());
    }

    #[tokio::test]
    async fn test_submit_sends_echoes_and_remembers() {
        let mut h = harness(MockApi::instant(), ServerStatus::Running);
        h.feed(ConnectionEvent::Opened { reconnected: false }).await;
        assert_eq!(h.session.connection_state(), ConnectionState::Open);

        h.session.submit_command("  say hi  ").await.unwrap();
        h.session.submit_command("list").await.unwrap();

        assert_eq!(
            h.outgoing.try_recv().unwrap(),
            ClientFrame::Command {
                command: "say hi".into()
            }
        );
        assert_eq!(h.texts(), vec!["> say hi", "> list"]);
        assert_eq!(h.session.navigate_history(HistoryDirection::Older), "list");
        assert_eq!(h.session.navigate_history(HistoryDirection::Older), "say hi");
        assert_eq!(h.session.navigate_history(HistoryDirection::Older), "say hi");
        assert_eq!(h.session.navigate_history(HistoryDirection::Newer), "list");
    }

    #[tokio::test]
    async fn test_submit_without_write_permission() {
        let mut h = harness_with(
            MockApi::instant(),
            ServerStatus::Running,
            &[permissions::CONSOLE_READ],
        );
        h.feed(ConnectionEvent::Opened { reconnected: false }).await;

        let err = h.session.submit_command("op me").await.unwrap_err();
        assert!(matches!(err, ConsoleError::PermissionDenied(_)));
        assert!(h.outgoing.try_recv().is_err());
        assert_eq!(h.session.logs().len(), 1);
        assert_eq!(h.session.logs().last().unwrap().origin, LogOrigin::System);
    }

    #[tokio::test]
    async fn test_frames_are_routed() {
        let mut h = harness(MockApi::instant(), ServerStatus::Running);
        h.feed(ConnectionEvent::Opened { reconnected: false }).await;
        h.feed(console("Done (3.2s)!")).await;
        h.feed(ConnectionEvent::Frame(ServerFrame::Console {
            line: "Pulling image".into(),
            color: Some("#facc15".into()),
            daemon: true,
        }))
        .await;
        h.feed(stats_frame(42.0)).await;

        assert_eq!(h.texts(), vec!["Done (3.2s)!", "Pulling image"]);
        let origins: Vec<LogOrigin> = h.session.logs().iter().map(|l| l.origin).collect();
        assert_eq!(origins, vec![LogOrigin::Server, LogOrigin::System]);
        assert_eq!(h.session.stats().unwrap().cpu_percent, 42.0);
        assert_eq!(
            h.session.stats_tracker().cpu_percent(h.session.server()),
            42.0
        );
    }

    #[tokio::test]
    async fn test_status_frame_to_stopped_resets_stats() {
        let mut h = harness(MockApi::instant(), ServerStatus::Running);
        h.feed(stats_frame(10.0)).await;
        h.feed(ConnectionEvent::Frame(ServerFrame::Status {
            status: ServerStatus::Stopped,
        }))
        .await;

        assert_eq!(h.session.status(), ServerStatus::Stopped);
        assert_eq!(h.session.server().status, ServerStatus::Stopped);
        assert_eq!(h.session.stats(), Some(&StatsSnapshot::EMPTY));
    }

    #[tokio::test]
    async fn test_stop_twice_escalates_to_one_kill() {
        let api = MockApi::gated();
        let mut h = harness(api.clone(), ServerStatus::Running);

        h.session.request_power_action(PowerAction::Stop).unwrap();
        h.session.request_power_action(PowerAction::Stop).unwrap();
        h.session.request_power_action(PowerAction::Stop).unwrap();
        assert!(h.session.power_state().is_escalating);

        api.release(2);
        h.pump().await;
        h.pump().await;

        let mut calls = api.calls();
        calls.sort_by_key(|a| a.as_str());
        assert_eq!(calls, vec![PowerAction::Kill, PowerAction::Stop]);
        assert_eq!(h.session.status(), ServerStatus::Stopped);
        assert_eq!(h.session.stats(), Some(&StatsSnapshot::EMPTY));
        assert_eq!(h.session.power_state().action_in_flight, None);
    }

    #[tokio::test]
    async fn test_start_twice_dispatches_once() {
        let api = MockApi::gated();
        let mut h = harness(api.clone(), ServerStatus::Stopped);

        h.session.request_power_action(PowerAction::Start).unwrap();
        h.session.request_power_action(PowerAction::Start).unwrap();
        assert_eq!(
            h.session.power_state().action_in_flight,
            Some(PowerAction::Start)
        );

        api.release(1);
        h.pump().await;
        assert_eq!(api.calls(), vec![PowerAction::Start]);
        assert_eq!(h.session.status(), ServerStatus::Running);
        assert!(h.session.status_view().is_optimistic());

        h.feed(ConnectionEvent::Frame(ServerFrame::Status {
            status: ServerStatus::Running,
        }))
        .await;
        assert!(!h.session.status_view().is_optimistic());
    }

    #[tokio::test]
    async fn test_restart_marks_stats_unknown() {
        let api = MockApi::instant();
        let mut h = harness(api.clone(), ServerStatus::Running);
        h.feed(stats_frame(55.0)).await;

        h.session.request_power_action(PowerAction::Restart).unwrap();
        assert!(h.session.stats().is_none());

        h.pump().await;
        assert_eq!(api.calls(), vec![PowerAction::Restart]);
        assert_eq!(h.session.status(), ServerStatus::Running);
        assert!(h.session.stats().is_none(), "unknown until the next sample");

        h.feed(stats_frame(3.0)).await;
        assert_eq!(h.session.stats().unwrap().cpu_percent, 3.0);
    }

    #[tokio::test]
    async fn test_power_failure_logs_error() {
        let api = MockApi::failing("node unreachable");
        let mut h = harness(api.clone(), ServerStatus::Running);

        h.session.request_power_action(PowerAction::Stop).unwrap();
        h.pump().await;

        let last = h.session.logs().last().unwrap();
        assert_eq!(last.text, "[ERROR] node unreachable");
        assert_eq!(last.color.as_deref(), Some(log_buffer::ERROR_COLOR));
        assert_eq!(h.session.status(), ServerStatus::Running);
        assert_eq!(h.session.power_state().action_in_flight, None);
    }

    #[tokio::test]
    async fn test_power_timeout_is_failure() {
        let api = MockApi::gated();
        let mut h = harness(api.clone(), ServerStatus::Stopped);
        h.session.power_timeout = Duration::from_millis(20);

        h.session.request_power_action(PowerAction::Start).unwrap();
        h.pump().await;

        let last = h.session.logs().last().unwrap();
        assert!(last.text.starts_with("[ERROR] Request timed out"), "{}", last.text);
        assert_eq!(h.session.status(), ServerStatus::Stopped);
        assert_eq!(h.session.power_state().action_in_flight, None);
    }

    #[tokio::test]
    async fn test_power_requires_permission() {
        let api = MockApi::instant();
        let mut h = harness_with(
            api.clone(),
            ServerStatus::Running,
            &[permissions::CONSOLE_READ, permissions::POWER_STOP],
        );

        let err = h.session.request_power_action(PowerAction::Restart).unwrap_err();
        assert!(matches!(err, ConsoleError::PermissionDenied(_)));
        assert_eq!(h.session.logs().len(), 1);

        // Escalating a pending stop needs power.kill too.
        let api_gated = MockApi::gated();
        let mut h = harness_with(
            api_gated.clone(),
            ServerStatus::Running,
            &[permissions::CONSOLE_READ, permissions::POWER_STOP],
        );
        h.session.request_power_action(PowerAction::Stop).unwrap();
        assert!(h.session.request_power_action(PowerAction::Stop).is_err());
        assert!(!h.session.power_state().is_escalating);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gap_marker_after_reconnect() {
        let mut h = harness(MockApi::instant(), ServerStatus::Running);
        h.feed(ConnectionEvent::Opened { reconnected: false }).await;
        h.feed(stats_frame(5.0)).await;
        h.feed(ConnectionEvent::Lost("reset".into())).await;
        assert_eq!(h.session.connection_state(), ConnectionState::Reconnecting);
        assert!(h.session.stats_tracker().is_stale());

        h.feed(ConnectionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(500),
        })
        .await;
        h.feed(ConnectionEvent::Opened { reconnected: true }).await;

        assert_eq!(h.session.connection_state(), ConnectionState::Open);
        assert_eq!(h.texts(), vec![GAP_MARKER]);
    }

    #[tokio::test]
    async fn test_rejection_sets_banner() {
        let mut h = harness(MockApi::instant(), ServerStatus::Running);
        h.feed(ConnectionEvent::Rejected("insufficient permission".into()))
            .await;
        assert_eq!(h.session.connection_state(), ConnectionState::Errored);
        assert_eq!(h.session.connection_error(), Some("insufficient permission"));
        assert!(matches!(
            h.session.submit_command("list").await,
            Err(ConsoleError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_error_frame_logs_and_rejects() {
        let mut h = harness(MockApi::instant(), ServerStatus::Running);
        h.feed(ConnectionEvent::Opened { reconnected: false }).await;
        h.feed(ConnectionEvent::Frame(ServerFrame::Error {
            message: "insufficient permission".into(),
        }))
        .await;
        h.feed(ConnectionEvent::Rejected("insufficient permission".into()))
            .await;

        assert_eq!(h.texts(), vec!["[ERROR] insufficient permission"]);
        assert_eq!(h.session.connection_state(), ConnectionState::Errored);
        assert_eq!(h.session.connection_error(), Some("insufficient permission"));
    }

    #[tokio::test]
    async fn test_status_frame_lifts_suspension() {
        let api = MockApi::instant();
        let mut h = harness(api.clone(), ServerStatus::Suspended);
        assert_eq!(h.session.status(), ServerStatus::Suspended);

        h.session.request_power_action(PowerAction::Start).unwrap();
        assert_eq!(h.session.power_state().action_in_flight, None);

        h.feed(ConnectionEvent::Frame(ServerFrame::Status {
            status: ServerStatus::Stopped,
        }))
        .await;
        assert_eq!(h.session.status(), ServerStatus::Stopped);

        h.session.request_power_action(PowerAction::Start).unwrap();
        assert_eq!(
            h.session.power_state().action_in_flight,
            Some(PowerAction::Start)
        );
        h.pump().await;
        assert_eq!(api.calls(), vec![PowerAction::Start]);
        assert_eq!(h.session.status(), ServerStatus::Running);
    }

    #[tokio::test]
    async fn test_server_record_keeps_confirmed_status() {
        let mut h = harness(MockApi::instant(), ServerStatus::Running);
        h.session.request_power_action(PowerAction::Stop).unwrap();
        h.pump().await;

        assert_eq!(h.session.status(), ServerStatus::Stopped);
        assert!(h.session.status_view().is_optimistic());
        assert_eq!(h.session.server().status, ServerStatus::Running);
    }

    #[tokio::test]
    async fn test_closed_session_ignores_late_completions() {
        let api = MockApi::gated();
        let mut h = harness(api.clone(), ServerStatus::Stopped);
        h.feed(console("hello")).await;

        h.session.request_power_action(PowerAction::Start).unwrap();
        h.session.close();
        h.session.close();
        api.release(1);
        tokio::task::yield_now().await;

        assert!(h.session.is_closed());
        assert!(h.session.logs().is_empty());
        assert!(h.session.next_event().await.is_none());

        h.session.handle_event(SessionEvent::Power(PowerCompletion {
            ticket: 1,
            action: PowerAction::Start,
            outcome: Err("late".into()),
        }));
        assert!(h.session.logs().is_empty());
        assert_eq!(h.session.status(), ServerStatus::Stopped);
        assert!(matches!(
            h.session.request_power_action(PowerAction::Start),
            Err(ConsoleError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_seed_from_status_response() {
        let mut h = harness(MockApi::instant(), ServerStatus::Stopped);
        assert_eq!(h.session.stats(), Some(&StatsSnapshot::EMPTY));

        h.session.seed(StatusResponse {
            status: ServerStatus::Running,
            stats: Some(StatsSnapshot {
                cpu_percent: 12.0,
                ..StatsSnapshot::EMPTY
            }),
        });
        assert_eq!(h.session.status(), ServerStatus::Running);
        assert_eq!(h.session.stats().unwrap().cpu_percent, 12.0);
    }

    #[tokio::test]
    async fn test_open_refuses_without_console_read() {
        struct NoAccess;

        #[async_trait]
        impl PanelApi for NoAccess {
            async fn power(&self, _: ServerId, _: PowerAction) -> Result<()> {
                Ok(())
            }
            async fn get_server(&self, _: ServerId) -> Result<Server> {
                Ok(server(ServerStatus::Running))
            }
            async fn get_permissions(&self, _: ServerId) -> Result<Vec<String>> {
                Ok(vec![permissions::POWER_START.to_string()])
            }
            async fn get_status(&self, _: ServerId) -> Result<StatusResponse> {
                Err(ConsoleError::http("unreachable"))
            }
        }

        let options = SessionOptions {
            server_id: Uuid::nil(),
            panel_url: Url::parse("http://127.0.0.1:1").unwrap(),
            token: "t".into(),
            scrollback_lines: 10,
            power_timeout: Duration::from_secs(1),
            reconnect: ReconnectPolicy::default(),
        };
        let result = Session::open(options, Arc::new(NoAccess)).await;
        assert!(matches!(result, Err(ConsoleError::PermissionDenied(_))));
    }
}
