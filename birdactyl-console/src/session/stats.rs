//! Telemetry tracking
//!
//! Holds the latest [`StatsSnapshot`] pushed over the console channel.
//! Three states are distinguished: no data yet (`None`), the empty sentinel
//! after a reset, and a live sample.

use std::time::Instant;

use birdactyl_protocol::{Server, StatsSnapshot};

#[derive(Debug, Default)]
pub struct StatsTracker {
    snapshot: Option<StatsSnapshot>,
    stale: bool,
    updated_at: Option<Instant>,
}

impl StatsTracker {
    /// Tracker with no data yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot wholesale with a fresh sample
    pub fn update(&mut self, snapshot: StatsSnapshot) {
        self.snapshot = Some(snapshot.sanitized());
        self.stale = false;
        self.updated_at = Some(Instant::now());
    }

    /// Reset to the empty sentinel (server stopped, or a start began)
    pub fn reset(&mut self) {
        self.snapshot = Some(StatsSnapshot::EMPTY);
        self.stale = false;
    }

    /// Forget the current sample until the next frame arrives
    pub fn mark_unknown(&mut self) {
        self.snapshot = None;
        self.stale = false;
    }

    /// Keep the last sample but flag it as no longer live (connection lost)
    pub fn mark_stale(&mut self) {
        if self.snapshot.is_some() {
            self.stale = true;
        }
    }

    /// `None` means "no data yet", distinct from the empty sentinel
    pub fn snapshot(&self) -> Option<&StatsSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn updated_at(&self) -> Option<Instant> {
        self.updated_at
    }

    /// Snapshot for display, falling back to the empty sentinel
    pub fn display(&self) -> StatsSnapshot {
        self.snapshot.unwrap_or(StatsSnapshot::EMPTY)
    }

    /// Memory usage against the reported limit, or the server's configured one
    pub fn memory_percent(&self, server: &Server) -> f64 {
        let stats = self.display();
        let limit = if stats.memory_limit_bytes > 0 {
            stats.memory_limit_bytes
        } else {
            server.memory_limit_bytes()
        };
        percent(stats.memory_usage_bytes as f64, limit as f64)
    }

    /// CPU usage against the server's CPU limit (both in percent)
    pub fn cpu_percent(&self, server: &Server) -> f64 {
        percent(self.display().cpu_percent, server.cpu as f64)
    }

    pub fn disk_percent(&self, server: &Server) -> f64 {
        percent(
            self.display().disk_usage_bytes as f64,
            server.disk_limit_bytes() as f64,
        )
    }
}

fn percent(usage: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        0.0
    } else {
        usage / limit * 100.0
    }
}
