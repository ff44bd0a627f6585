//! Common test utilities for kubewire integration tests
//!
//! - wiremock based `TransportConfig` helpers
//! - a counting credential provider
//! - a minimal API server stand-in that answers plain requests with
//!   "Upgrade request required" and speaks `base64.channel.k8s.io` on
//!   WebSocket requests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use kubewire::{AuthRefreshError, CredentialProvider, ProviderRegistry, Transport, TransportConfig};
use kubewire::AuthProviderConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message, Role};
use tokio_tungstenite::WebSocketStream;
use wiremock::MockServer;

/// Body an API server sends when exec/attach needs the channel protocol
pub const UPGRADE_REQUIRED_BODY: &str = r#"{"kind":"Status","apiVersion":"v1","metadata":{},"status":"Failure","message":"Upgrade request required","reason":"BadRequest","code":400}"#;

/// Transport config pointed at a mock server
pub fn config_for(server: &MockServer) -> TransportConfig {
    TransportConfig::new(server.uri())
}

/// Provider handing out `fresh-1`, `fresh-2`, ... and counting calls
#[derive(Debug, Default)]
pub struct CountingProvider {
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialProvider for CountingProvider {
    fn refresh(&self) -> BoxFuture<'_, Result<String, AuthRefreshError>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("fresh-{}", n))
        })
    }
}

/// Provider that always fails
#[derive(Debug)]
pub struct BrokenProvider;

impl CredentialProvider for BrokenProvider {
    fn refresh(&self) -> BoxFuture<'_, Result<String, AuthRefreshError>> {
        Box::pin(async {
            Err(AuthRefreshError::Provider {
                provider: "broken".to_string(),
                reason: "credential source unavailable".to_string(),
            })
        })
    }
}

/// Transport whose config names a registered custom provider
pub fn transport_with_provider(
    config: TransportConfig,
    provider: Arc<dyn CredentialProvider>,
) -> Transport {
    let mut registry = ProviderRegistry::empty();
    registry.register_custom("test-provider", provider);
    let config = config.with_auth_provider(AuthProviderConfig::new("test-provider"));
    Transport::with_registry(config, &registry).unwrap()
}

/// How the channel server ends a WebSocket session
#[derive(Debug, Clone)]
pub enum Ending {
    /// Send a close frame with this code and reason
    Close(u16, String),
    /// Drop the socket without a closing handshake
    Abort,
}

/// How the channel server turns away a plain HTTP request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// `400 Bad Request` with a Kubernetes `Status` body
    StatusBody,
    /// `400 Upgrade request required` with an empty body
    ReasonPhrase,
}

/// One request head the channel server received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_websocket(&self) -> bool {
        self.header("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
    }
}

/// Stand-in API server for exec/attach calls
pub struct ChannelServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ChannelServer {
    /// Start a server that sends `frames` on every WebSocket session and
    /// then ends it as `ending` says
    pub async fn start(frames: Vec<Message>, ending: Ending) -> Self {
        Self::start_with(frames, ending, Rejection::StatusBody).await
    }

    /// Like `start`, rejecting plain requests as `rejection` says
    pub async fn start_with(frames: Vec<Message>, ending: Ending, rejection: Rejection) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let frames = frames.clone();
                let ending = ending.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    serve_connection(socket, frames, ending, rejection, recorded).await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn websocket_requests(&self) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(RecordedRequest::is_websocket).collect()
    }

    pub fn config(&self) -> TransportConfig {
        TransportConfig::new(self.base_url.clone())
    }
}

/// Server answering every request with the same raw HTTP response
pub async fn raw_http_server(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_head(&mut socket).await.is_some() {
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
        }
    });
    format!("http://{}", addr)
}

/// Frame with a raw channel index byte
pub fn raw_frame(channel: u8, text: &str) -> Message {
    use base64::Engine as _;
    let mut data = vec![channel];
    data.extend_from_slice(base64::engine::general_purpose::STANDARD.encode(text).as_bytes());
    Message::binary(data)
}

/// Frame with an ASCII digit channel, as API servers send it
pub fn text_frame(channel: u8, text: &str) -> Message {
    use base64::Engine as _;
    Message::text(format!(
        "{}{}",
        channel,
        base64::engine::general_purpose::STANDARD.encode(text)
    ))
}

async fn read_head(socket: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let byte = socket.read_u8().await.ok()?;
        head.push(byte);
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

fn parse_head(head: &str) -> RecordedRequest {
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    RecordedRequest { request_line, headers }
}

async fn serve_connection(
    mut socket: TcpStream,
    frames: Vec<Message>,
    ending: Ending,
    rejection: Rejection,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let Some(head) = read_head(&mut socket).await else {
        return;
    };
    let request = parse_head(&head);
    recorded.lock().unwrap().push(request.clone());

    if !request.is_websocket() {
        let response = match rejection {
            Rejection::StatusBody => format!(
                "HTTP/1.1 400 Bad Request\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                UPGRADE_REQUIRED_BODY.len(),
                UPGRADE_REQUIRED_BODY
            ),
            Rejection::ReasonPhrase => {
                "HTTP/1.1 400 Upgrade request required\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
            }
        };
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        return;
    }

    let key = request.header("sec-websocket-key").unwrap_or_default().to_string();
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\nSec-WebSocket-Protocol: base64.channel.k8s.io\r\n\r\n",
        derive_accept_key(key.as_bytes())
    );
    if socket.write_all(response.as_bytes()).await.is_err() {
        return;
    }

    let mut ws = WebSocketStream::from_raw_socket(socket, Role::Server, None).await;
    for frame in frames {
        if ws.send(frame).await.is_err() {
            return;
        }
    }

    match ending {
        Ending::Close(code, reason) => {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            };
            let _ = ws.close(Some(frame)).await;
            while let Some(Ok(_)) = ws.next().await {}
        }
        Ending::Abort => drop(ws),
    }
}
