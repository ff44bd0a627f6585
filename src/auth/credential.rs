//! Shared bearer credential
//!
//! The credential is replaced as a whole; readers always see either the old
//! or the new token, never a mix. Each replacement bumps a generation
//! counter so a caller can tell whether someone refreshed after it looked.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// One immutable credential snapshot
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: Option<String>,
    generation: u64,
}

impl Credential {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("generation", &self.generation)
            .finish()
    }
}

/// Holder of the current credential for one transport
#[derive(Debug)]
pub struct CredentialStore {
    current: RwLock<Arc<Credential>>,
}

impl CredentialStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            current: RwLock::new(Arc::new(Credential { token, generation: 0 })),
        }
    }

    /// Current credential
    pub fn snapshot(&self) -> Arc<Credential> {
        // A panicked writer cannot leave a half-written Arc behind
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap in a new token and return the new snapshot
    pub fn replace(&self, token: String) -> Arc<Credential> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(Credential {
            token: Some(token),
            generation: current.generation + 1,
        });
        *current = next.clone();
        next
    }
}
