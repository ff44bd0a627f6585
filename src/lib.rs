//! kubewire library interface
//!
//! HTTP transport for Kubernetes API clients: builds requests from
//! descriptors, refreshes bearer credentials on 401/403, decodes or streams
//! responses, and speaks the `base64.channel.k8s.io` protocol for
//! exec/attach style calls.
//!
//! # Module Organization
//!
//! - [`request`] - Request descriptors, query encoding, URL and header building
//! - [`transport`] - The executor ([`Transport`]) and its [`CallOutcome`]
//! - [`auth`] - Credential store, providers, and the single-flight refresher
//! - [`response`] - Response normalization (JSON, text, empty)
//! - [`stream`] - Byte and JSON-object streams over live bodies
//! - [`upgrade`] - Channel frame codec and the upgraded connection
//! - [`config`] - [`TransportConfig`] and TOML settings
//! - [`tls`] - Certificate material for both HTTP and WebSocket connections
//! - [`logging`] - `tracing` subscriber setup
//! - [`errors`] - Error types (KubewireError, Result)

pub mod auth;
pub mod config;
pub mod errors;
pub mod logging;
pub mod request;
pub mod response;
pub mod stream;
pub mod tls;
pub mod transport;
pub mod upgrade;

pub use auth::{AuthProvider, AuthRefreshError, CredentialProvider, ProviderRegistry};
pub use config::{AuthProviderConfig, TransportConfig};
pub use errors::{KubewireError, Result};
pub use request::{QueryValue, RequestDescriptor};
pub use response::{NormalizedResponse, ResponseBody};
pub use stream::{JsonObjectStream, ResponseStream};
pub use tls::TlsConfig;
pub use transport::{CallOutcome, Transport};
pub use upgrade::{Channel, ChannelEvent, ChannelFrame, ChannelState, UpgradeResult, UpgradedConnection};
