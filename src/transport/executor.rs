//! Transport executor
//!
//! One logical call:
//! 1. send with the current credential, bound to a cancellation token
//! 2. on 401/403 with an auth provider configured, refresh once and resend
//! 3. a 400 asking for the channel protocol hands off to the upgrader
//! 4. any other non-success status is a `Transport` error
//! 5. streamed calls return the live body, the rest are normalized

use std::sync::Arc;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::outcome::CallOutcome;
use crate::auth::{AuthRefresher, Credential, CredentialStore, ProviderRegistry};
use crate::config::TransportConfig;
use crate::errors::KubewireError;
use crate::request::{build_request, PreparedRequest, RequestDescriptor};
use crate::response::{normalize_response, reason_phrase, NormalizedResponse};
use crate::stream::{JsonObjectStream, ResponseStream};
use crate::upgrade::{is_upgrade_required, UpgradedConnection};

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// HTTP transport for one API server
#[derive(Debug, Clone)]
pub struct Transport {
    config: Arc<TransportConfig>,
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
    refresher: Option<Arc<AuthRefresher>>,
}

impl Transport {
    /// Create a transport resolving auth providers from the built-in registry
    pub fn new(config: TransportConfig) -> Result<Self, KubewireError> {
        Self::with_registry(config, &ProviderRegistry::default())
    }

    /// Create a transport resolving auth providers from `registry`.
    ///
    /// An unknown provider name fails here, not on the first 401.
    pub fn with_registry(config: TransportConfig, registry: &ProviderRegistry) -> Result<Self, KubewireError> {
        let client = config.tls.apply_to_builder(reqwest::Client::builder())?.build()?;
        let credentials = Arc::new(CredentialStore::new(config.bearer_token.clone()));

        let refresher = match &config.auth_provider {
            Some(provider_config) => {
                let provider = registry.resolve(provider_config)?;
                debug!(
                    provider = %provider_config.name,
                    kind = provider.type_name(),
                    "Resolved auth provider"
                );
                Some(Arc::new(AuthRefresher::new(provider, credentials.clone())))
            }
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            client,
            credentials,
            refresher,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Credential the next call will present
    pub fn credential(&self) -> Arc<Credential> {
        self.credentials.snapshot()
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn has_auth_provider(&self) -> bool {
        self.refresher.is_some()
    }

    /// Run one logical call
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<CallOutcome, KubewireError> {
        self.execute_with_cancel(descriptor, CancellationToken::new()).await
    }

    /// Run one logical call bound to `cancel`.
    ///
    /// Cancelling the token aborts the call while it waits for a response;
    /// for a streamed call the token is handed to the returned stream.
    ///
    /// A streamed call whose final status is not a success does not return
    /// a stream. Its body is read in full and surfaced as a `Transport`
    /// error, the same as a non-streamed call.
    pub async fn execute_with_cancel(
        &self,
        descriptor: &RequestDescriptor,
        cancel: CancellationToken,
    ) -> Result<CallOutcome, KubewireError> {
        let credential = self.credentials.snapshot();
        let mut prepared = build_request(descriptor, &self.config, credential.token())?;
        let mut response = self.send(&prepared, &cancel).await?;

        if is_auth_failure(response.status()) {
            if let Some(refresher) = &self.refresher {
                warn!(
                    status = response.status().as_u16(),
                    url = %prepared.url,
                    "Authentication rejected, refreshing credential"
                );
                drop(response);

                let fresh = refresher.refresh(&credential).await?;
                prepared = build_request(descriptor, &self.config, fresh.token())?;
                response = self.send(&prepared, &cancel).await?;
            }
        }

        let status = response.status();
        if !status.is_success() {
            let reason = reason_phrase(&response);
            let body = response.text().await?;
            if is_upgrade_required(status.as_u16(), reason.as_deref(), &body) {
                info!(url = %prepared.url, "Upgrade required, switching to channel protocol");
                let connection = self.connect_channel(&prepared).await?;
                return Ok(CallOutcome::Upgrade(connection.finish().await?));
            }

            debug!(status = status.as_u16(), url = %prepared.url, "Request failed");
            return Err(KubewireError::Transport {
                status_code: status.as_u16(),
                body,
            });
        }

        if descriptor.is_stream() {
            debug!(status = status.as_u16(), url = %prepared.url, "Returning response stream");
            return Ok(CallOutcome::Stream(ResponseStream::new(response, cancel)));
        }

        let normalized = normalize_response(response, descriptor.declared_produces()).await?;
        Ok(CallOutcome::Response(normalized))
    }

    /// Run a non-streamed call and return its decoded response
    pub async fn request(&self, descriptor: &RequestDescriptor) -> Result<NormalizedResponse, KubewireError> {
        self.execute(descriptor).await?.into_response()
    }

    /// Stream the raw body, e.g. container logs
    pub async fn log_stream(&self, descriptor: &RequestDescriptor) -> Result<ResponseStream, KubewireError> {
        self.execute(&descriptor.as_stream()).await?.into_stream()
    }

    /// Stream one JSON value per watch event
    pub async fn watch_stream(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<JsonObjectStream<ResponseStream>, KubewireError> {
        Ok(self.log_stream(descriptor).await?.into_json_objects())
    }

    /// Open a channel connection directly, for interactive exec/attach
    pub async fn open_channel(&self, descriptor: &RequestDescriptor) -> Result<UpgradedConnection, KubewireError> {
        let credential = self.credentials.snapshot();
        let prepared = build_request(descriptor, &self.config, credential.token())?;
        self.connect_channel(&prepared).await
    }

    async fn connect_channel(&self, prepared: &PreparedRequest) -> Result<UpgradedConnection, KubewireError> {
        UpgradedConnection::connect(&prepared.url, &prepared.headers, &self.config.tls, self.config.timeout).await
    }

    /// Send one attempt and wait for the response headers
    async fn send(
        &self,
        prepared: &PreparedRequest,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, KubewireError> {
        debug!(method = %prepared.method, url = %prepared.url, "Sending request");

        let mut request = self
            .client
            .request(prepared.method.clone(), &prepared.url)
            .headers(prepared.headers.clone());
        if let Some(body) = &prepared.body {
            request = request.body(body.clone());
        }

        let timeout = self.config.timeout;
        let send = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, request.send())
                    .await
                    .map_err(|_| KubewireError::Timeout(limit.as_secs_f64()))?
                    .map_err(KubewireError::from),
                None => request.send().await.map_err(KubewireError::from),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url = %prepared.url, "Request cancelled");
                Err(KubewireError::Cancelled)
            }
            result = send => result,
        }
    }
}
