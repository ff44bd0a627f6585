//! Credential provider resolution
//!
//! Providers are a closed set of built-in variants plus a `Custom` escape
//! hatch for applications that register their own. The identity string from
//! the configuration is resolved once, when the transport is created.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::command::CommandProvider;
use super::oidc::OidcProvider;
use super::AuthRefreshError;
use crate::config::AuthProviderConfig;

/// A user-supplied credential source
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// Produce a fresh bearer token
    fn refresh(&self) -> BoxFuture<'_, Result<String, AuthRefreshError>>;
}

/// A resolved credential provider
#[derive(Debug, Clone)]
pub enum AuthProvider {
    /// External command (`cmd`, `gcp`)
    Command(CommandProvider),
    /// OpenID Connect refresh token (`oidc`, `openid`)
    Oidc(Arc<OidcProvider>),
    /// Application-registered provider
    Custom(Arc<dyn CredentialProvider>),
}

impl AuthProvider {
    /// Obtain a fresh bearer token
    pub async fn refresh(&self) -> Result<String, AuthRefreshError> {
        match self {
            AuthProvider::Command(p) => p.refresh().await,
            AuthProvider::Oidc(p) => p.refresh().await,
            AuthProvider::Custom(p) => p.refresh().await,
        }
    }

    /// Provider type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            AuthProvider::Command(_) => "command",
            AuthProvider::Oidc(_) => "oidc",
            AuthProvider::Custom(_) => "custom",
        }
    }
}

/// Builds a provider from its configuration
pub type ProviderFactory =
    Arc<dyn Fn(&AuthProviderConfig) -> Result<AuthProvider, AuthRefreshError> + Send + Sync>;

/// Identity string to provider factory
#[derive(Clone)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ProviderRegistry").field("providers", &names).finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ProviderRegistry {
    /// Registry with no providers
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `cmd`, `gcp`, `oidc`, and `openid` providers
    pub fn with_builtins() -> Self {
        let command: ProviderFactory = Arc::new(|config: &AuthProviderConfig| {
            CommandProvider::from_config(config).map(AuthProvider::Command)
        });
        let oidc: ProviderFactory = Arc::new(|config: &AuthProviderConfig| {
            OidcProvider::from_config(config).map(|p| AuthProvider::Oidc(Arc::new(p)))
        });

        let mut registry = Self::empty();
        registry.factories.insert("cmd".to_string(), command.clone());
        registry.factories.insert("gcp".to_string(), command);
        registry.factories.insert("oidc".to_string(), oidc.clone());
        registry.factories.insert("openid".to_string(), oidc);
        registry
    }

    /// Register (or replace) a provider under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&AuthProviderConfig) -> Result<AuthProvider, AuthRefreshError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register a fixed custom provider instance under `name`
    pub fn register_custom(&mut self, name: impl Into<String>, provider: Arc<dyn CredentialProvider>) {
        self.register(name, move |_| Ok(AuthProvider::Custom(provider.clone())));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Resolve a configured identity to a provider
    pub fn resolve(&self, config: &AuthProviderConfig) -> Result<AuthProvider, AuthRefreshError> {
        let factory = self
            .factories
            .get(&config.name)
            .ok_or_else(|| AuthRefreshError::UnknownProvider {
                identity: config.name.clone(),
            })?;
        factory(config)
    }
}
