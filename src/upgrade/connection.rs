//! Upgraded channel connection
//!
//! `Connecting -> Open -> Closed`. The handshake runs in [`UpgradedConnection::connect`];
//! afterwards the caller drains [`ChannelEvent`]s until the server closes the
//! connection or it fails. Every inbound frame is recorded in arrival order and
//! handed back either in the [`UpgradeResult`] or, on failure, in the
//! `Upgrade` error.

use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderName as WsHeaderName, HeaderValue as WsHeaderValue},
        protocol::Message,
    },
    Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::channel::{decode_frame, encode_frame, Channel, ChannelFrame, CHANNEL_PROTOCOL};
use super::transcript::{Transcript, UpgradeResult};
use crate::errors::KubewireError;
use crate::tls::TlsConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the server drops the connection without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported for a close frame without a status
pub const NO_STATUS_RECEIVED: u16 = 1005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// One event drained from an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Frame(ChannelFrame),
    Closed { code: u16, reason: String },
}

/// A live `base64.channel.k8s.io` connection
pub struct UpgradedConnection {
    stream: Option<WsStream>,
    state: ChannelState,
    transcript: Transcript,
    close: Option<(u16, String)>,
    failure: Option<String>,
}

impl std::fmt::Debug for UpgradedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradedConnection")
            .field("state", &self.state)
            .field("frames", &self.transcript.len())
            .field("close", &self.close)
            .finish()
    }
}

fn upgrade_error(message: impl Into<String>) -> KubewireError {
    KubewireError::Upgrade {
        message: message.into(),
        messages: Vec::new(),
    }
}

/// Map an `http(s)` request URL onto its `ws(s)` counterpart
pub fn websocket_url(url: &str) -> Result<url::Url, KubewireError> {
    let mut ws_url = url::Url::parse(url)?;
    let scheme = match ws_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(upgrade_error(format!("Unsupported scheme for upgrade: {}", other))),
    };
    ws_url
        .set_scheme(scheme)
        .map_err(|_| upgrade_error(format!("Cannot upgrade URL: {}", url)))?;
    Ok(ws_url)
}

impl UpgradedConnection {
    /// Perform the handshake for `url` with the request headers of the
    /// original call (authorization included).
    pub async fn connect(
        url: &str,
        headers: &HeaderMap,
        tls: &TlsConfig,
        timeout: Option<Duration>,
    ) -> Result<Self, KubewireError> {
        let mut state = ChannelState::Connecting;
        let ws_url = websocket_url(url)?;
        debug!(url = %ws_url, state = ?state, "Upgrading to channel protocol");

        let mut request = ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| upgrade_error(format!("Invalid WebSocket request: {}", e)))?;

        let ws_headers = request.headers_mut();
        for (name, value) in headers {
            if name == CONTENT_TYPE {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                WsHeaderName::from_bytes(name.as_str().as_bytes()),
                WsHeaderValue::from_bytes(value.as_bytes()),
            ) {
                ws_headers.insert(name, value);
            }
        }
        ws_headers.insert("Sec-WebSocket-Protocol", WsHeaderValue::from_static(CHANNEL_PROTOCOL));

        let connector = if ws_url.scheme() == "wss" {
            Some(Connector::Rustls(tls.rustls_client_config()?))
        } else {
            None
        };

        let connect_future = connect_async_tls_with_config(request, None, false, connector);
        let (stream, response) = match timeout {
            Some(limit) => tokio::time::timeout(limit, connect_future)
                .await
                .map_err(|_| KubewireError::Timeout(limit.as_secs_f64()))?,
            None => connect_future.await,
        }
        .map_err(|e| upgrade_error(format!("Connection failed: {}", e)))?;

        if let Some(proto) = response.headers().get("Sec-WebSocket-Protocol") {
            debug!(protocol = ?proto, "Negotiated subprotocol");
        }

        state = ChannelState::Open;
        info!(url = %ws_url, state = ?state, "Channel connection open");

        Ok(Self {
            stream: Some(stream),
            state,
            transcript: Transcript::new(),
            close: None,
            failure: None,
        })
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Frames received so far
    pub fn messages(&self) -> &[ChannelFrame] {
        self.transcript.messages()
    }

    /// Wait for the next frame or the close.
    ///
    /// Returns `Ok(None)` once the connection is closed.
    pub async fn next_event(&mut self) -> Result<Option<ChannelEvent>, KubewireError> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };

            let data = match stream.next().await {
                Some(Ok(Message::Text(text))) => text.as_str().as_bytes().to_vec(),
                Some(Ok(Message::Binary(data))) => data.to_vec(),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                        None => (NO_STATUS_RECEIVED, String::new()),
                    };
                    // Flush the close reply; the peer may already be gone
                    let _ = stream.close(None).await;
                    return Ok(Some(self.closed(code, reason)));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(self.fail(format!("Connection error: {}", e))),
                None => return Ok(Some(self.closed(ABNORMAL_CLOSURE, String::new()))),
            };

            match decode_frame(&data) {
                Ok(frame) => {
                    debug!(channel = %frame.channel, bytes = frame.payload.len(), "Channel frame");
                    self.transcript.push(frame.clone());
                    return Ok(Some(ChannelEvent::Frame(frame)));
                }
                Err(e) => return Err(self.fail(e.to_string())),
            }
        }
    }

    /// Write `data` to `channel`
    pub async fn send(&mut self, channel: Channel, data: &[u8]) -> Result<(), KubewireError> {
        let stream = match (self.state, self.stream.as_mut()) {
            (ChannelState::Open, Some(stream)) => stream,
            _ => return Err(upgrade_error("Channel connection is closed")),
        };
        stream
            .send(encode_frame(channel, data))
            .await
            .map_err(|e| upgrade_error(format!("Send failed: {}", e)))
    }

    /// Announce a new terminal size on the resize channel
    pub async fn resize(&mut self, width: u16, height: u16) -> Result<(), KubewireError> {
        let payload = serde_json::to_vec(&serde_json::json!({ "Width": width, "Height": height }))?;
        self.send(Channel::Resize, &payload).await
    }

    /// Drain the connection to its terminal result
    pub async fn finish(mut self) -> Result<UpgradeResult, KubewireError> {
        while self.next_event().await?.is_some() {}

        if let Some(message) = self.failure.take() {
            return Err(KubewireError::Upgrade {
                message,
                messages: self.transcript.into_messages(),
            });
        }

        let (code, reason) = self.close.take().unwrap_or((ABNORMAL_CLOSURE, String::new()));
        Ok(self.transcript.finish(code, reason))
    }

    /// The connection as a stream of events
    pub fn into_events(self) -> impl Stream<Item = Result<ChannelEvent, KubewireError>> {
        futures::stream::unfold(self, |mut conn| async move {
            match conn.next_event().await {
                Ok(Some(event)) => Some((Ok(event), conn)),
                Ok(None) => None,
                Err(e) => Some((Err(e), conn)),
            }
        })
    }

    fn closed(&mut self, code: u16, reason: String) -> ChannelEvent {
        self.stream = None;
        self.state = ChannelState::Closed;
        info!(code, reason = %reason, frames = self.transcript.len(), "Channel connection closed");
        self.close = Some((code, reason.clone()));
        ChannelEvent::Closed { code, reason }
    }

    fn fail(&mut self, message: String) -> KubewireError {
        self.stream = None;
        self.state = ChannelState::Closed;
        warn!(error = %message, frames = self.transcript.len(), "Channel connection failed");
        self.failure = Some(message.clone());
        KubewireError::Upgrade {
            message,
            messages: self.transcript.messages().to_vec(),
        }
    }
}
