//! Live console client for servers hosted on a Birdactyl panel
//!
//! The [`Session`] ties together the console channel ([`Connection`]), the
//! panel REST API ([`PanelApi`]) and the local state a console keeps: the
//! log buffer, telemetry, command history and power action tracking. The
//! [`ui`] module renders a session in the terminal.

pub mod api;
pub mod cli;
pub mod config;
pub mod connection;
pub mod session;
pub mod ui;

pub use api::{HttpPanelApi, PanelApi, PermissionOracle, PermissionSet};
pub use config::{ConfigLoader, ConsoleConfig};
pub use connection::{Connection, ConnectionEvent, ConnectionState, ReconnectPolicy};
pub use session::{Session, SessionEvent, SessionOptions};
