//! WebSocket link: `ws(s)://<host>/<namespace>/ws`, JSON text frames.

use futures::{SinkExt, StreamExt};
use matchpulse_protocol::ClientMessage;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::LiveError;
use crate::transport::{
    decode_frame, encode_command, AuthPayload, EventSink, LinkEnd, TransportEvent,
};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) fn websocket_url(config: &TransportConfig) -> Result<Url, LiveError> {
    let mut url = config.namespace_url("ws");
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| LiveError::InvalidEndpoint(format!("cannot use {} over websocket", url)))?;
    Ok(url)
}

pub(crate) async fn open(
    config: &TransportConfig,
    auth: &AuthPayload,
) -> Result<WsStream, LiveError> {
    let url = websocket_url(config)?;
    let mut request = url.as_str().into_client_request()?;
    if let Some(token) = auth.token.as_deref() {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| LiveError::InvalidCredential)?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    debug!(
        component = "websocket",
        event = "ws.handshake.start",
        url = %url,
        has_token = auth.token.is_some(),
        "Opening websocket"
    );

    let (stream, _response) =
        tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| LiveError::Timeout(config.connect_timeout))??;
    Ok(stream)
}

/// Pump frames in both directions until either side goes away.
pub(crate) async fn run(
    stream: WsStream,
    commands: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events: &EventSink,
) -> LinkEnd {
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return LinkEnd::Closed;
                };
                let json = match encode_command(&command) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(
                            component = "websocket",
                            event = "ws.send.serialize_failed",
                            error = %e,
                            "Failed to serialize client message"
                        );
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                    return LinkEnd::Dropped(e.to_string());
                }
            }

            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(msg) = decode_frame(&text) {
                        if !events.emit(TransportEvent::Message(msg)).await {
                            return LinkEnd::Closed;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "server closed connection".to_string());
                    return LinkEnd::Dropped(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return LinkEnd::Dropped(e.to_string()),
                None => return LinkEnd::Dropped("stream ended".to_string()),
            },
        }
    }
}
