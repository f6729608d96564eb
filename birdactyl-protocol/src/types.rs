//! Panel entities read by the console
//!
//! These mirror the JSON the panel's REST layer returns. Only the fields the
//! console needs are modelled; anything else in the payload is ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a hosted server
pub type ServerId = Uuid;

/// Bytes in one mebibyte (server limits are configured in MiB)
pub const MIB: u64 = 1024 * 1024;

/// Authoritative lifecycle status of a hosted server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Installing,
    Running,
    Stopped,
    Suspended,
    Failed,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Installing => "installing",
            ServerStatus::Running => "running",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Suspended => "suspended",
            ServerStatus::Failed => "failed",
        }
    }

    /// Whether telemetry from a previous run must be discarded on entering this status
    pub fn clears_telemetry(&self) -> bool {
        matches!(self, ServerStatus::Stopped | ServerStatus::Installing)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hosted server as returned by `GET /servers/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: ServerStatus,
    #[serde(default)]
    pub is_suspended: bool,
    /// Memory limit in MiB
    pub memory: u64,
    /// CPU limit in percent (100 = one core)
    pub cpu: u64,
    /// Disk limit in MiB
    pub disk: u64,
}

impl Server {
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory.saturating_mul(MIB)
    }

    pub fn disk_limit_bytes(&self) -> u64 {
        self.disk.saturating_mul(MIB)
    }

    pub fn is_running(&self) -> bool {
        self.status == ServerStatus::Running
    }

    /// Suspension can be flagged either way by the panel
    pub fn is_suspended(&self) -> bool {
        self.is_suspended || self.status == ServerStatus::Suspended
    }
}

/// One telemetry sample pushed by the server process
///
/// Field names on the wire follow the panel's status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(rename = "memory", default)]
    pub memory_usage_bytes: u64,
    #[serde(rename = "memory_limit", default)]
    pub memory_limit_bytes: u64,
    #[serde(rename = "cpu", default)]
    pub cpu_percent: f64,
    #[serde(rename = "disk", default)]
    pub disk_usage_bytes: u64,
    #[serde(rename = "network_rx", default)]
    pub net_rx_bytes: u64,
    #[serde(rename = "network_tx", default)]
    pub net_tx_bytes: u64,
}

impl StatsSnapshot {
    /// Sentinel used when no live data is available
    pub const EMPTY: StatsSnapshot = StatsSnapshot {
        memory_usage_bytes: 0,
        memory_limit_bytes: 0,
        cpu_percent: 0.0,
        disk_usage_bytes: 0,
        net_rx_bytes: 0,
        net_tx_bytes: 0,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Clamp negative or non-finite CPU readings to zero
    pub fn sanitized(mut self) -> Self {
        if !self.cpu_percent.is_finite() || self.cpu_percent < 0.0 {
            self.cpu_percent = 0.0;
        }
        self
    }
}

/// Power transitions the panel exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Start,
    Stop,
    Restart,
    Kill,
}

impl PowerAction {
    pub const ALL: [PowerAction; 4] = [
        PowerAction::Start,
        PowerAction::Stop,
        PowerAction::Restart,
        PowerAction::Kill,
    ];

    /// Path segment of `POST /servers/{id}/{action}`
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
            PowerAction::Restart => "restart",
            PowerAction::Kill => "kill",
        }
    }

    /// Permission required to dispatch this action
    pub fn permission(&self) -> &'static str {
        match self {
            PowerAction::Start => permissions::POWER_START,
            PowerAction::Stop => permissions::POWER_STOP,
            PowerAction::Restart => permissions::POWER_RESTART,
            PowerAction::Kill => permissions::POWER_KILL,
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-level success/failure envelope wrapping every REST response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T = serde_json::Value> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Split into the payload or the server-provided failure reason
    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "request failed".to_string()))
        }
    }
}

/// Payload of `GET /servers/{id}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ServerStatus,
    #[serde(default)]
    pub stats: Option<StatsSnapshot>,
}

/// Permission names the console consults
pub mod permissions {
    pub const POWER_START: &str = "power.start";
    pub const POWER_STOP: &str = "power.stop";
    pub const POWER_RESTART: &str = "power.restart";
    pub const POWER_KILL: &str = "power.kill";

    pub const CONSOLE_READ: &str = "console.read";
    pub const CONSOLE_WRITE: &str = "console.write";

    /// Wildcard held by server owners and administrators
    pub const ADMIN: &str = "*";

    pub fn has_permission(granted: &[String], required: &str) -> bool {
        granted.iter().any(|p| p == ADMIN || p == required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_json() -> &'static str {
        r#"{
            "id": "4f1c2a9e-8b7d-4e1a-9c3f-2d6b5a4e3f21",
            "name": "survival",
            "description": "",
            "user_id": "00000000-0000-0000-0000-000000000001",
            "status": "running",
            "is_suspended": false,
            "memory": 2048,
            "cpu": 200,
            "disk": 10240,
            "ports": [{"port": 25565, "primary": true}]
        }"#
    }

    #[test]
    fn test_server_deserialize_ignores_extra_fields() {
        let server: Server = serde_json::from_str(server_json()).unwrap();
        assert_eq!(server.name, "survival");
        assert_eq!(server.status, ServerStatus::Running);
        assert_eq!(server.memory_limit_bytes(), 2048 * MIB);
        assert_eq!(server.disk_limit_bytes(), 10240 * MIB);
        assert!(server.is_running());
    }

    #[test]
    fn test_server_suspended_via_status() {
        let mut server: Server = serde_json::from_str(server_json()).unwrap();
        assert!(!server.is_suspended());
        server.status = ServerStatus::Suspended;
        assert!(server.is_suspended());
    }

    #[test]
    fn test_status_wire_names() {
        let status: ServerStatus = serde_json::from_str("\"installing\"").unwrap();
        assert_eq!(status, ServerStatus::Installing);
        assert_eq!(ServerStatus::Failed.to_string(), "failed");
        assert!(serde_json::from_str::<ServerStatus>("\"exploded\"").is_err());
    }

    #[test]
    fn test_clears_telemetry() {
        assert!(ServerStatus::Stopped.clears_telemetry());
        assert!(ServerStatus::Installing.clears_telemetry());
        assert!(!ServerStatus::Running.clears_telemetry());
        assert!(!ServerStatus::Failed.clears_telemetry());
    }

    #[test]
    fn test_stats_wire_names() {
        let json = r#"{"memory": 1048576, "memory_limit": 0, "cpu": 12.5,
                       "disk": 4096, "network_rx": 10, "network_tx": 20}"#;
        let stats: StatsSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(stats.memory_usage_bytes, 1_048_576);
        assert_eq!(stats.cpu_percent, 12.5);
        assert_eq!(stats.net_tx_bytes, 20);
        assert!(!stats.is_empty());
    }

    #[test]
    fn test_stats_missing_fields_default_to_zero() {
        let stats: StatsSnapshot = serde_json::from_str(r#"{"cpu": 3.0}"#).unwrap();
        assert_eq!(stats.memory_usage_bytes, 0);
        assert_eq!(stats.cpu_percent, 3.0);
    }

    #[test]
    fn test_stats_empty_sentinel() {
        assert!(StatsSnapshot::EMPTY.is_empty());
        assert_eq!(StatsSnapshot::default(), StatsSnapshot::EMPTY);
    }

    #[test]
    fn test_stats_sanitized() {
        let stats = StatsSnapshot {
            cpu_percent: -4.0,
            ..StatsSnapshot::EMPTY
        };
        assert_eq!(stats.sanitized().cpu_percent, 0.0);

        let stats = StatsSnapshot {
            cpu_percent: f64::NAN,
            ..StatsSnapshot::EMPTY
        };
        assert_eq!(stats.sanitized().cpu_percent, 0.0);
    }

    #[test]
    fn test_power_action_paths_and_permissions() {
        assert_eq!(PowerAction::Restart.as_str(), "restart");
        assert_eq!(PowerAction::Kill.permission(), "power.kill");
        assert_eq!(PowerAction::ALL.len(), 4);
    }

    #[test]
    fn test_envelope_success() {
        let env: ApiEnvelope = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert_eq!(env.into_result(), Ok(None));
    }

    #[test]
    fn test_envelope_failure_reason() {
        let env: ApiEnvelope =
            serde_json::from_str(r#"{"success": false, "error": "node offline"}"#).unwrap();
        assert_eq!(env.into_result(), Err("node offline".to_string()));
    }

    #[test]
    fn test_envelope_failure_without_reason() {
        let env: ApiEnvelope = serde_json::from_str(r#"{"success": false, "error": " "}"#).unwrap();
        assert_eq!(env.into_result(), Err("request failed".to_string()));
    }

    #[test]
    fn test_status_response_without_stats() {
        let resp: StatusResponse = serde_json::from_str(r#"{"status": "stopped"}"#).unwrap();
        assert_eq!(resp.status, ServerStatus::Stopped);
        assert!(resp.stats.is_none());
    }

    #[test]
    fn test_has_permission() {
        let granted = vec!["console.read".to_string(), "power.start".to_string()];
        assert!(permissions::has_permission(&granted, permissions::POWER_START));
        assert!(!permissions::has_permission(&granted, permissions::POWER_KILL));

        let admin = vec!["*".to_string()];
        assert!(permissions::has_permission(&admin, permissions::POWER_KILL));
        assert!(!permissions::has_permission(&[], permissions::CONSOLE_READ));
    }
}
