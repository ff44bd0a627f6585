//! Bearer credential refresh
//!
//! Provides:
//! - the shared [`CredentialStore`] a transport reads its token from
//! - built-in credential providers (external command, OpenID Connect)
//! - a [`ProviderRegistry`] resolving kubeconfig `auth-provider` names
//! - the single-flight [`AuthRefresher`] invoked after a 401/403

pub mod command;
pub mod credential;
pub mod oidc;
pub mod provider;
pub mod refresher;

pub use command::CommandProvider;
pub use credential::{Credential, CredentialStore};
pub use oidc::OidcProvider;
pub use provider::{AuthProvider, CredentialProvider, ProviderFactory, ProviderRegistry};
pub use refresher::AuthRefresher;

use thiserror::Error;

/// Failure to obtain a fresh credential
#[derive(Debug, Error)]
pub enum AuthRefreshError {
    #[error("unknown auth provider '{identity}'")]
    UnknownProvider { identity: String },

    #[error("auth provider '{provider}' requires '{key}' in its config")]
    MissingConfig { provider: String, key: String },

    #[error("credential command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    #[error("auth provider '{provider}' failed: {reason}")]
    Provider { provider: String, reason: String },

    #[error("auth provider '{provider}' returned an empty credential")]
    EmptyToken { provider: String },

    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl AuthRefreshError {
    /// Short machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            AuthRefreshError::UnknownProvider { .. } => "unknown-provider",
            AuthRefreshError::MissingConfig { .. } => "missing-config",
            AuthRefreshError::Command { .. } => "command-failed",
            AuthRefreshError::Provider { .. } => "provider-failed",
            AuthRefreshError::EmptyToken { .. } => "empty-token",
            AuthRefreshError::Http(_) => "http",
        }
    }
}
