//! `base64.channel.k8s.io` frame codec
//!
//! Each WebSocket message carries one frame: a leading channel byte followed
//! by the base64 encoded payload. API servers send the channel as an ASCII
//! digit on this subprotocol; the raw index is accepted as well.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Negotiated WebSocket subprotocol
pub const CHANNEL_PROTOCOL: &str = "base64.channel.k8s.io";

/// Logical stream a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Stdin,
    Stdout,
    Stderr,
    Error,
    Resize,
}

impl Channel {
    /// All channels in index order
    pub const ALL: [Channel; 5] = [
        Channel::Stdin,
        Channel::Stdout,
        Channel::Stderr,
        Channel::Error,
        Channel::Resize,
    ];

    pub fn index(self) -> u8 {
        match self {
            Channel::Stdin => 0,
            Channel::Stdout => 1,
            Channel::Stderr => 2,
            Channel::Error => 3,
            Channel::Resize => 4,
        }
    }

    /// Resolve a leading frame byte, raw (`0x01`) or ASCII (`b'1'`)
    pub fn from_byte(byte: u8) -> Option<Channel> {
        let index = match byte {
            b'0'..=b'4' => byte - b'0',
            other => other,
        };
        Channel::ALL.get(usize::from(index)).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Stdin => "stdin",
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
            Channel::Error => "error",
            Channel::Resize => "resize",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One demultiplexed inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFrame {
    pub channel: Channel,
    /// Decoded payload bytes
    pub payload: Vec<u8>,
}

impl ChannelFrame {
    pub fn new(channel: Channel, payload: Vec<u8>) -> Self {
        Self { channel, payload }
    }

    /// Payload interpreted as ASCII text
    pub fn message(&self) -> String {
        self.payload.iter().map(|b| char::from(b & 0x7f)).collect()
    }
}

/// Reasons a frame could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Empty,
    UnknownChannel(u8),
    InvalidBase64(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Empty => write!(f, "empty channel frame"),
            FrameError::UnknownChannel(b) => write!(f, "unknown channel index {}", b),
            FrameError::InvalidBase64(e) => write!(f, "invalid base64 payload: {}", e),
        }
    }
}

impl std::error::Error for FrameError {}

/// Decode the bytes of one inbound message
pub fn decode_frame(data: &[u8]) -> Result<ChannelFrame, FrameError> {
    let (&first, rest) = data.split_first().ok_or(FrameError::Empty)?;
    let channel = Channel::from_byte(first).ok_or(FrameError::UnknownChannel(first))?;

    // Some servers wrap long payloads; whitespace is not part of the alphabet
    let encoded: Vec<u8> = rest.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
    let payload = BASE64
        .decode(&encoded)
        .map_err(|e| FrameError::InvalidBase64(e.to_string()))?;

    Ok(ChannelFrame::new(channel, payload))
}

/// Encode an outbound frame as a text message
pub fn encode_frame(channel: Channel, payload: &[u8]) -> Message {
    let mut text = String::with_capacity(1 + payload.len() * 4 / 3 + 4);
    text.push(char::from(b'0' + channel.index()));
    BASE64.encode_string(payload, &mut text);
    Message::text(text)
}
