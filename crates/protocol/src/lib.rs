//! MatchPulse Protocol
//!
//! Shared types for the live-analysis realtime channel.
//! These types are serialized as JSON text frames over WebSocket or
//! carried in the bodies of the HTTP polling fallback.

use uuid::Uuid;

pub mod client;
pub mod server;
pub mod types;

pub use client::ClientMessage;
pub use server::ServerMessage;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
