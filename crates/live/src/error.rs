use std::time::Duration;

use thiserror::Error;

/// Errors raised by the live-analysis client
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Access token is not a valid header value")]
    InvalidCredential,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not connected")]
    NotConnected,

    #[error("Channel closed")]
    ChannelClosed,
}
