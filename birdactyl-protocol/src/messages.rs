//! Console WebSocket frame types

use serde::{Deserialize, Serialize};

use crate::types::{ServerStatus, StatsSnapshot};

/// Frames sent from the console client to the panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Write a line to the server process stdin
    Command { command: String },
}

impl ClientFrame {
    /// Build a command frame, trimming surrounding whitespace
    ///
    /// Returns `None` for empty or whitespace-only input.
    pub fn command(raw: &str) -> Option<Self> {
        let command = raw.trim();
        if command.is_empty() {
            None
        } else {
            Some(ClientFrame::Command {
                command: command.to_string(),
            })
        }
    }
}

/// Frames pushed by the panel over the console channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// One line of console output
    Console {
        #[serde(alias = "data")]
        line: String,
        /// Display color hint (CSS-style, e.g. `#ef4444`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        /// Output emitted by the node daemon rather than the server process
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        daemon: bool,
    },

    /// Resource telemetry sample; replaces the previous one wholesale
    Stats(StatsSnapshot),

    /// Authoritative status change
    Status { status: ServerStatus },

    /// Application-level rejection (e.g. missing console permission)
    Error { message: String },
}

impl ServerFrame {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Console { .. } => "console",
            ServerFrame::Stats(_) => "stats",
            ServerFrame::Status { .. } => "status",
            ServerFrame::Error { .. } => "error",
        }
    }
}
