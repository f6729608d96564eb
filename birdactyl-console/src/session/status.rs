//! Server status as seen by the console
//!
//! The panel (REST fetch or socket `status` frame) is authoritative. A
//! successful power call sets a local optimistic value that is shown until
//! the next confirmed update arrives.

use birdactyl_protocol::ServerStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusView {
    confirmed: ServerStatus,
    optimistic: Option<ServerStatus>,
    suspended: bool,
}

impl StatusView {
    pub fn new(confirmed: ServerStatus, suspended: bool) -> Self {
        Self {
            confirmed,
            optimistic: None,
            suspended,
        }
    }

    /// Record a status reported by the panel
    ///
    /// Also replaces the suspension flag the view was created with.
    /// Returns true when the effective status changed.
    pub fn confirm(&mut self, status: ServerStatus) -> bool {
        let before = self.effective();
        self.confirmed = status;
        self.optimistic = None;
        self.suspended = status == ServerStatus::Suspended;
        before != self.effective()
    }

    /// Record the status implied by a successful power call
    pub fn assume(&mut self, status: ServerStatus) -> bool {
        let before = self.effective();
        self.optimistic = Some(status);
        before != self.effective()
    }

    /// Status to display and to gate power actions with
    pub fn effective(&self) -> ServerStatus {
        if self.suspended {
            return ServerStatus::Suspended;
        }
        self.optimistic.unwrap_or(self.confirmed)
    }

    pub fn confirmed(&self) -> ServerStatus {
        self.confirmed
    }

    pub fn is_optimistic(&self) -> bool {
        self.optimistic.is_some() && !self.suspended
    }
}
