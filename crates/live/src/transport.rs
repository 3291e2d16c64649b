//! Transport layer.
//!
//! A transport is a background task that owns one realtime link (WebSocket,
//! or HTTP long-polling as a fallback), forwards outbound `ClientMessage`s
//! from its command channel, and reports lifecycle signals and inbound
//! `ServerMessage`s as `TransportEvent`s tagged with its generation.

use std::sync::Arc;

use arc_swap::ArcSwap;
use matchpulse_protocol::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{TransportConfig, TransportKind};
use crate::error::LiveError;
use crate::{polling, websocket};

/// Credentials presented during the handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthPayload {
    pub token: Option<String>,
}

impl AuthPayload {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

/// Lifecycle signals and pushes produced by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected { kind: TransportKind },
    Disconnected { reason: Option<String> },
    ConnectError { message: String },
    Message(ServerMessage),
}

/// A `TransportEvent` stamped with the generation of the transport that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Sending half a transport task reports through
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::Sender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::Sender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once nobody is listening any more.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .await
            .is_ok()
    }
}

/// Everything handed to a connector when a connection attempt starts
pub struct ConnectRequest {
    pub config: TransportConfig,
    /// Shared with the manager so a refreshed token reaches reconnects too
    pub auth: Arc<ArcSwap<AuthPayload>>,
    pub commands: mpsc::UnboundedReceiver<ClientMessage>,
    pub events: EventSink,
}

/// Starts transport tasks. The seam the connection manager is tested through.
pub trait Connector: Send + Sync + 'static {
    fn start(&self, request: ConnectRequest) -> JoinHandle<()>;
}

/// The production connector: WebSocket first, polling as a fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeConnector;

impl Connector for RealtimeConnector {
    fn start(&self, request: ConnectRequest) -> JoinHandle<()> {
        tokio::spawn(run_transport(request))
    }
}

/// How a link's pump loop ended
#[derive(Debug)]
pub(crate) enum LinkEnd {
    /// The owner closed the command channel or stopped listening
    Closed,
    /// The remote side went away
    Dropped(String),
}

enum Link {
    Websocket(websocket::WsStream),
    Polling(polling::PollingLink),
}

async fn open_any(
    config: &TransportConfig,
    auth: &AuthPayload,
) -> Result<(TransportKind, Link), String> {
    let mut last_error = String::from("no transports configured");

    for kind in &config.transports {
        let attempt = match kind {
            TransportKind::Websocket => websocket::open(config, auth).await.map(Link::Websocket),
            TransportKind::Polling => polling::open(config, auth).await.map(Link::Polling),
        };
        match attempt {
            Ok(link) => return Ok((*kind, link)),
            Err(e) => {
                warn!(
                    component = "transport",
                    event = "transport.open_failed",
                    transport = kind.as_str(),
                    error = %e,
                    "Transport failed to open, trying next"
                );
                last_error = e.to_string();
            }
        }
    }

    Err(last_error)
}

async fn run_link(
    link: Link,
    commands: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events: &EventSink,
) -> LinkEnd {
    match link {
        Link::Websocket(stream) => websocket::run(stream, commands, events).await,
        Link::Polling(link) => polling::run(link, commands, events).await,
    }
}

async fn run_transport(mut request: ConnectRequest) {
    let generation = request.events.generation();
    let policy = request.config.reconnect.clone();
    let mut established = false;
    let mut attempt: u32 = 0;

    loop {
        let auth = request.auth.load_full();
        match open_any(&request.config, &auth).await {
            Ok((kind, link)) => {
                established = true;
                attempt = 0;
                info!(
                    component = "transport",
                    event = "transport.connected",
                    generation,
                    transport = kind.as_str(),
                    "Transport connected"
                );
                if !request.events.emit(TransportEvent::Connected { kind }).await {
                    return;
                }

                match run_link(link, &mut request.commands, &request.events).await {
                    LinkEnd::Closed => return,
                    LinkEnd::Dropped(reason) => {
                        warn!(
                            component = "transport",
                            event = "transport.dropped",
                            generation,
                            reason = %reason,
                            "Transport dropped"
                        );
                        let event = TransportEvent::Disconnected {
                            reason: Some(reason),
                        };
                        if !request.events.emit(event).await {
                            return;
                        }
                    }
                }
            }
            Err(message) => {
                if !established || !policy.enabled || attempt >= policy.max_attempts {
                    let _ = request
                        .events
                        .emit(TransportEvent::ConnectError { message })
                        .await;
                    return;
                }
            }
        }

        // Dropped with reconnects off: Disconnected was the last word.
        if !policy.enabled || attempt >= policy.max_attempts {
            return;
        }
        attempt += 1;
        let delay = policy.delay_for(attempt);
        info!(
            component = "transport",
            event = "transport.reconnect_scheduled",
            generation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting transport"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Parse one inbound text frame; malformed frames are logged and dropped.
pub(crate) fn decode_frame(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!(
                component = "transport",
                event = "transport.frame.parse_failed",
                error = %e,
                payload_bytes = text.len(),
                payload_preview = %truncate_for_log(text, 240),
                "Failed to parse server message"
            );
            None
        }
    }
}

pub(crate) fn encode_command(command: &ClientMessage) -> Result<String, LiveError> {
    Ok(serde_json::to_string(command)?)
}

fn truncate_for_log(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
