//! Client configuration.
//!
//! `ClientConfig` is the on-disk TOML shape; `TransportConfig` is the
//! validated form the connection manager is built from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::LiveError;
use crate::transition::EventDedup;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";
pub const DEFAULT_NAMESPACE: &str = "/analysis";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Transport flavours, tried in configured order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Websocket,
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Websocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }
}

/// Backoff for transport-level reconnects after an established link drops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), doubling up to the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Everything a transport needs to reach the realtime endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub endpoint: Url,
    pub namespace: String,
    pub transports: Vec<TransportKind>,
    pub auto_connect: bool,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl TransportConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            namespace: DEFAULT_NAMESPACE.to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            auto_connect: false,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Endpoint joined with the namespace and `suffix`, keeping any base path.
    pub fn namespace_url(&self, suffix: &str) -> Url {
        let mut url = self.endpoint.clone();
        let mut path = url.path().trim_end_matches('/').to_string();
        for segment in [self.namespace.as_str(), suffix] {
            let segment = segment.trim_matches('/');
            if !segment.is_empty() {
                path.push('/');
                path.push_str(segment);
            }
        }
        url.set_path(&path);
        url
    }
}

/// On-disk client configuration (`config.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub namespace: String,
    pub transports: Vec<TransportKind>,
    pub auto_connect: bool,
    pub connect_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
    pub dedupe_events: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            auto_connect: false,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect: ReconnectPolicy::default(),
            dedupe_events: false,
            token_file: None,
        }
    }
}

impl ClientConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, LiveError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(toml::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn transport_config(&self) -> Result<TransportConfig, LiveError> {
        let endpoint = Url::parse(self.endpoint.trim())
            .map_err(|e| LiveError::InvalidEndpoint(format!("{}: {}", self.endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(LiveError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                endpoint.scheme()
            )));
        }
        if self.transports.is_empty() {
            return Err(LiveError::Config(
                "at least one transport must be enabled".to_string(),
            ));
        }

        Ok(TransportConfig {
            endpoint,
            namespace: self.namespace.clone(),
            transports: self.transports.clone(),
            auto_connect: self.auto_connect,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect: self.reconnect.clone(),
        })
    }

    pub fn event_dedup(&self) -> EventDedup {
        if self.dedupe_events {
            EventDedup::ById
        } else {
            EventDedup::AppendAll
        }
    }
}
