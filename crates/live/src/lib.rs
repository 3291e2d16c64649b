//! MatchPulse live analysis client
//!
//! Follows one server-side analysis job over a realtime connection and
//! reconciles its pushes (progress, tracking frames, detected match events,
//! completion) into a single read-only `LiveSnapshot`.
//!
//! The pieces, leaf first:
//! - `ConnectionManager` owns the one transport (WebSocket, polling fallback)
//! - `transition` folds commands and transport events into state, purely
//! - `LiveSessionHandle` drives both from a single actor task

pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
mod polling;
pub mod session_actor;
pub mod session_command;
pub mod snapshot;
pub mod transition;
pub mod transport;
mod websocket;

pub use config::{ClientConfig, ReconnectPolicy, TransportConfig, TransportKind};
pub use connection::{ConnectionManager, TransportEvents};
pub use credentials::{CredentialSource, EnvToken, FileToken, StaticToken};
pub use error::LiveError;
pub use session_actor::{LiveSessionHandle, SessionOptions};
pub use session_command::Subscription;
pub use snapshot::{LiveSnapshot, LiveStatus};
pub use transition::EventDedup;
pub use transport::{Connector, RealtimeConnector, TransportEvent};
