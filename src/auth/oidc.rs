//! OpenID Connect refresh-token provider
//!
//! Exchanges the configured refresh token for a new ID token at the
//! issuer's token endpoint. The endpoint is discovered from
//! `{idp-issuer-url}/.well-known/openid-configuration` on first use.
//!
//! Config keys: `idp-issuer-url`, `client-id`, `refresh-token` (required),
//! `client-secret` (optional).

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::AuthRefreshError;
use crate::config::AuthProviderConfig;

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    token_endpoint: String,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
}

/// OAuth 2.0 error response
#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug)]
struct OidcState {
    token_endpoint: Option<String>,
    refresh_token: String,
}

/// Provider for the kubeconfig `oidc` auth-provider
#[derive(Debug)]
pub struct OidcProvider {
    provider: String,
    issuer_url: String,
    client_id: String,
    client_secret: Option<String>,
    http: reqwest::Client,
    state: Mutex<OidcState>,
}

impl OidcProvider {
    pub fn from_config(config: &AuthProviderConfig) -> Result<Self, AuthRefreshError> {
        let required = |key: &str| {
            config
                .get(key)
                .filter(|v| !v.is_empty())
                .map(String::from)
                .ok_or_else(|| AuthRefreshError::MissingConfig {
                    provider: config.name.clone(),
                    key: key.to_string(),
                })
        };

        let issuer_url = required("idp-issuer-url")?.trim_end_matches('/').to_string();
        let client_id = required("client-id")?;
        let refresh_token = required("refresh-token")?;

        Ok(Self {
            provider: config.name.clone(),
            issuer_url,
            client_id,
            client_secret: config.get("client-secret").map(String::from),
            http: reqwest::Client::new(),
            state: Mutex::new(OidcState {
                token_endpoint: None,
                refresh_token,
            }),
        })
    }

    pub async fn refresh(&self) -> Result<String, AuthRefreshError> {
        let mut state = self.state.lock().await;

        let token_endpoint = match &state.token_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let endpoint = self.discover().await?;
                state.token_endpoint = Some(endpoint.clone());
                endpoint
            }
        };

        debug!(provider = %self.provider, endpoint = %token_endpoint, "Requesting OIDC token");

        let refresh_token = state.refresh_token.clone();
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(&token_endpoint)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let reason = match serde_json::from_str::<TokenError>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => format!("token endpoint returned {}: {}", status, body),
            };
            return Err(AuthRefreshError::Provider {
                provider: self.provider.clone(),
                reason,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| AuthRefreshError::Provider {
            provider: self.provider.clone(),
            reason: format!("invalid token response: {}", e),
        })?;

        // Issuers may rotate the refresh token
        if let Some(rotated) = token.refresh_token {
            state.refresh_token = rotated;
        }

        token
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthRefreshError::EmptyToken {
                provider: self.provider.clone(),
            })
    }

    async fn discover(&self) -> Result<String, AuthRefreshError> {
        let url = format!("{}/.well-known/openid-configuration", self.issuer_url);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(AuthRefreshError::Provider {
                provider: self.provider.clone(),
                reason: format!("discovery at {} returned {}", url, response.status()),
            });
        }

        let document: DiscoveryDocument = response.json().await.map_err(|e| AuthRefreshError::Provider {
            provider: self.provider.clone(),
            reason: format!("invalid discovery document: {}", e),
        })?;
        Ok(document.token_endpoint)
    }
}
