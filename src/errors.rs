//! Error types for kubewire

use thiserror::Error;

use crate::auth::AuthRefreshError;
use crate::upgrade::ChannelFrame;

/// Main error type for kubewire
#[derive(Error, Debug)]
pub enum KubewireError {
    /// The API server answered with a non-success status after at most one
    /// auth retry. `body` is the raw response text.
    #[error("HTTP {status_code}: {body}")]
    Transport { status_code: u16, body: String },

    #[error("Auth refresh error: {0}")]
    AuthRefresh(#[from] AuthRefreshError),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The upgraded channel connection failed. `messages` holds every frame
    /// received before the failure.
    #[error("Upgrade error: {message}")]
    Upgrade {
        message: String,
        messages: Vec<ChannelFrame>,
    },

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Timeout after {0:.1} seconds")]
    Timeout(f64),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KubewireError {
    /// HTTP status of a `Transport` error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            KubewireError::Transport { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Same value as [`status_code`](Self::status_code), kept for callers
    /// that read the older `code` field.
    pub fn code(&self) -> Option<u16> {
        self.status_code()
    }

    /// Raw response body of a `Transport` error
    pub fn body(&self) -> Option<&str> {
        match self {
            KubewireError::Transport { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Frames received before an `Upgrade` error
    pub fn messages(&self) -> Option<&[ChannelFrame]> {
        match self {
            KubewireError::Upgrade { messages, .. } => Some(messages),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, KubewireError>;
