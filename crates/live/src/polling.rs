//! HTTP long-polling fallback.
//!
//! `POST <ns>/poll` opens a poll session, `GET <ns>/poll/<sid>` waits for
//! queued server messages, `POST <ns>/poll/<sid>` delivers one client message.

use matchpulse_protocol::{ClientMessage, PollBatch, PollHandshake, ServerMessage};
use reqwest::{RequestBuilder, Url};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::LiveError;
use crate::transport::{AuthPayload, EventSink, LinkEnd, TransportEvent};

pub(crate) struct PollingLink {
    client: reqwest::Client,
    session_url: Url,
    auth: AuthPayload,
}

pub(crate) fn polling_url(config: &TransportConfig, suffix: &str) -> Result<Url, LiveError> {
    let mut url = config.namespace_url(suffix);
    let scheme = match url.scheme() {
        "wss" | "https" => "https",
        _ => "http",
    };
    url.set_scheme(scheme)
        .map_err(|_| LiveError::InvalidEndpoint(format!("cannot poll {}", url)))?;
    Ok(url)
}

fn with_auth(builder: RequestBuilder, auth: &AuthPayload) -> RequestBuilder {
    match auth.token.as_deref() {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

pub(crate) async fn open(
    config: &TransportConfig,
    auth: &AuthPayload,
) -> Result<PollingLink, LiveError> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()?;
    let handshake_url = polling_url(config, "poll")?;

    debug!(
        component = "polling",
        event = "poll.handshake.start",
        url = %handshake_url,
        has_token = auth.token.is_some(),
        "Opening polling session"
    );

    let handshake: PollHandshake = with_auth(client.post(handshake_url), auth)
        .timeout(config.connect_timeout)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let session_url = polling_url(config, &format!("poll/{}", handshake.sid))?;
    Ok(PollingLink {
        client,
        session_url,
        auth: auth.clone(),
    })
}

impl PollingLink {
    async fn poll(&self) -> Result<Vec<ServerMessage>, LiveError> {
        let batch: PollBatch<Value> =
            with_auth(self.client.get(self.session_url.clone()), &self.auth)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

        Ok(decode_batch(batch))
    }

    async fn send(&self, command: &ClientMessage) -> Result<(), LiveError> {
        with_auth(self.client.post(self.session_url.clone()), &self.auth)
            .json(command)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Decode entries one at a time; an unknown entry is logged and skipped.
fn decode_batch(batch: PollBatch<Value>) -> Vec<ServerMessage> {
    batch
        .messages
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!(
                    component = "polling",
                    event = "poll.message.parse_failed",
                    error = %e,
                    "Dropping unparseable polled message"
                );
                None
            }
        })
        .collect()
}

/// Keep one long-poll in flight while forwarding commands as they arrive.
pub(crate) async fn run(
    link: PollingLink,
    commands: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events: &EventSink,
) -> LinkEnd {
    loop {
        let poll = link.poll();
        tokio::pin!(poll);

        loop {
            tokio::select! {
                batch = &mut poll => {
                    match batch {
                        Ok(messages) => {
                            for msg in messages {
                                if !events.emit(TransportEvent::Message(msg)).await {
                                    return LinkEnd::Closed;
                                }
                            }
                        }
                        Err(e) => return LinkEnd::Dropped(e.to_string()),
                    }
                    break;
                }

                command = commands.recv() => {
                    let Some(command) = command else {
                        return LinkEnd::Closed;
                    };
                    if let Err(e) = link.send(&command).await {
                        return LinkEnd::Dropped(e.to_string());
                    }
                }
            }
        }
    }
}
