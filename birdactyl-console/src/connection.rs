//! Console channel connection management
//!
//! Owns the per-server WebSocket: connect, reject-or-proceed, frame
//! dispatch, reconnection with backoff, and teardown. Everything the
//! background task observes is surfaced through one ordered event queue.

mod backoff;
mod client;
mod handler;

pub use backoff::{Backoff, ReconnectPolicy};
pub use client::{socket_url, ConnectOptions, Connection, ConnectionEvent, ConnectionState};
pub use handler::{Disconnect, REJECTION_CLOSE_CODES};
