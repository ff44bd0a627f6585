//! Single-flight credential refresh
//!
//! Concurrent callers that all saw a 401/403 with the same credential
//! generation share one provider call: the first takes the lock and
//! refreshes, the rest find the generation already advanced and reuse the
//! new credential.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::credential::{Credential, CredentialStore};
use super::provider::AuthProvider;
use super::AuthRefreshError;

/// Refreshes the bearer credential of one transport
#[derive(Debug)]
pub struct AuthRefresher {
    provider: AuthProvider,
    store: Arc<CredentialStore>,
    in_flight: Mutex<()>,
}

impl AuthRefresher {
    pub fn new(provider: AuthProvider, store: Arc<CredentialStore>) -> Self {
        Self {
            provider,
            store,
            in_flight: Mutex::new(()),
        }
    }

    pub fn provider(&self) -> &AuthProvider {
        &self.provider
    }

    /// Refresh the credential the caller observed to be rejected.
    ///
    /// Provider failures propagate; the stored credential is left untouched.
    pub async fn refresh(&self, observed: &Credential) -> Result<Arc<Credential>, AuthRefreshError> {
        let _guard = self.in_flight.lock().await;

        let current = self.store.snapshot();
        if current.generation() > observed.generation() {
            debug!(
                generation = current.generation(),
                "Credential already refreshed by a concurrent call"
            );
            return Ok(current);
        }

        info!(provider = self.provider.type_name(), "Refreshing bearer credential");
        match self.provider.refresh().await {
            Ok(token) => {
                let next = self.store.replace(token);
                debug!(generation = next.generation(), "Bearer credential replaced");
                Ok(next)
            }
            Err(e) => {
                warn!(provider = self.provider.type_name(), error = %e, "Credential refresh failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialProvider;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl CredentialProvider for Counting {
        fn refresh(&self) -> BoxFuture<'_, Result<String, AuthRefreshError>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(format!("token-{}", n))
            })
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl CredentialProvider for Failing {
        fn refresh(&self) -> BoxFuture<'_, Result<String, AuthRefreshError>> {
            Box::pin(async {
                Err(AuthRefreshError::Provider {
                    provider: "failing".to_string(),
                    reason: "no token".to_string(),
                })
            })
        }
    }

    #[tokio::test]
    async fn test_refresh_replaces_credential() {
        let store = Arc::new(CredentialStore::new(Some("stale".to_string())));
        let provider = Arc::new(Counting::default());
        let refresher = AuthRefresher::new(AuthProvider::Custom(provider.clone()), store.clone());

        let observed = store.snapshot();
        let next = refresher.refresh(&observed).await.unwrap();

        assert_eq!(next.token(), Some("token-1"));
        assert_eq!(store.snapshot().token(), Some("token-1"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_call() {
        let store = Arc::new(CredentialStore::new(Some("stale".to_string())));
        let provider = Arc::new(Counting::default());
        let refresher = Arc::new(AuthRefresher::new(AuthProvider::Custom(provider.clone()), store.clone()));

        let observed = store.snapshot();
        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let refresher = refresher.clone();
                let observed = observed.clone();
                tokio::spawn(async move { refresher.refresh(&observed).await })
            })
            .collect();

        for task in tasks {
            let credential = task.await.unwrap().unwrap();
            assert_eq!(credential.token(), Some("token-1"));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_later_rejection_refreshes_again() {
        let store = Arc::new(CredentialStore::new(None));
        let provider = Arc::new(Counting::default());
        let refresher = AuthRefresher::new(AuthProvider::Custom(provider.clone()), store.clone());

        refresher.refresh(&store.snapshot()).await.unwrap();
        let second = refresher.refresh(&store.snapshot()).await.unwrap();

        assert_eq!(second.token(), Some("token-2"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_old_credential() {
        let store = Arc::new(CredentialStore::new(Some("stale".to_string())));
        let refresher = AuthRefresher::new(AuthProvider::Custom(Arc::new(Failing)), store.clone());

        let err = refresher.refresh(&store.snapshot()).await.unwrap_err();
        assert!(matches!(err, AuthRefreshError::Provider { .. }));
        assert_eq!(store.snapshot().token(), Some("stale"));
        assert_eq!(store.snapshot().generation(), 0);
    }
}
