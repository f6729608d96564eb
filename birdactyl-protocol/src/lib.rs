//! birdactyl-protocol: Shared wire definitions for the server console
//!
//! This crate defines the frames exchanged over the per-server console
//! WebSocket, the JSON codec for them, and the panel entities the console
//! reads over REST.

pub mod codec;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{decode_server_frame, encode_client_frame, CodecError};
pub use messages::{ClientFrame, ServerFrame};
pub use types::{
    permissions, ApiEnvelope, PowerAction, Server, ServerId, ServerStatus, StatsSnapshot,
    StatusResponse, MIB,
};

/// API prefix shared by the REST and WebSocket endpoints
pub const API_PREFIX: &str = "/api/v1";
