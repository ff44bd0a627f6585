//! Transport configuration
//!
//! `TransportConfig` is built in code or loaded from a TOML settings file:
//!
//! ```toml
//! server = "https://10.0.0.1:6443"
//! certificate-authority = "/etc/kubewire/ca.pem"
//! timeout-secs = 30
//!
//! [auth-provider]
//! name = "oidc"
//! config = { idp-issuer-url = "https://issuer", client-id = "kube", refresh-token = "r1" }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::KubewireError;
use crate::tls::TlsConfig;

/// Identity and settings of a credential provider, as found in a
/// kubeconfig `auth-provider` stanza
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthProviderConfig {
    pub name: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl AuthProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BTreeMap::new(),
        }
    }

    /// Add a provider setting
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

/// Connection settings for one API server
#[derive(Clone, Default)]
pub struct TransportConfig {
    /// Base URL of the API server, without trailing slash
    pub base_url: String,
    pub tls: TlsConfig,
    /// Applied to the initial call and to the retry after an auth refresh
    pub timeout: Option<Duration>,
    /// Initial bearer credential
    pub bearer_token: Option<String>,
    pub auth_provider: Option<AuthProviderConfig>,
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("base_url", &self.base_url)
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("auth_provider", &self.auth_provider.as_ref().map(|p| &p.name))
            .finish()
    }
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            ..Default::default()
        }
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_auth_provider(mut self, provider: AuthProviderConfig) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    /// Load configuration from a TOML settings file
    pub fn load(path: &Path) -> Result<Self, KubewireError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KubewireError::Config(format!("Failed to read config '{}': {}", path.display(), e)))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_settings(parse_settings(&content)?, base_dir)
    }

    /// Parse configuration from TOML text. Relative file paths are resolved
    /// against the current directory.
    pub fn from_toml_str(content: &str) -> Result<Self, KubewireError> {
        Self::from_settings(parse_settings(content)?, Path::new("."))
    }

    fn from_settings(settings: TransportSettings, base_dir: &Path) -> Result<Self, KubewireError> {
        if settings.server.trim().is_empty() {
            return Err(KubewireError::Config("'server' must not be empty".to_string()));
        }
        url::Url::parse(&settings.server)?;

        let resolve = |p: &Option<PathBuf>| p.as_ref().map(|p| base_dir.join(p));
        let ca = resolve(&settings.certificate_authority);
        let cert = resolve(&settings.client_certificate);
        let key = resolve(&settings.client_key);

        let mut tls = TlsConfig::from_files(ca.as_deref(), cert.as_deref(), key.as_deref())?;
        tls.insecure_skip_tls_verify = settings.insecure_skip_tls_verify;

        let mut config = Self::new(settings.server).with_tls(tls);
        config.timeout = settings
            .timeout_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| KubewireError::Config(format!("Invalid 'timeout-secs' {}: {}", secs, e)))
            })
            .transpose()?;
        config.bearer_token = settings.token.filter(|t| !t.is_empty());
        config.auth_provider = settings.auth_provider;
        Ok(config)
    }
}

/// On-disk settings layout
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TransportSettings {
    server: String,
    certificate_authority: Option<PathBuf>,
    client_certificate: Option<PathBuf>,
    client_key: Option<PathBuf>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
    timeout_secs: Option<f64>,
    token: Option<String>,
    auth_provider: Option<AuthProviderConfig>,
}

fn parse_settings(content: &str) -> Result<TransportSettings, KubewireError> {
    toml::from_str(content).map_err(|e| KubewireError::Config(format!("Invalid config TOML: {}", e)))
}
