//! In-memory token storage.

use std::sync::{Arc, RwLock};

use tracing::instrument;

use super::TokenStorage;
use crate::token::TokenSet;

/// In-memory token storage.
///
/// Holds the token set in an `Arc<RwLock<..>>` slot, so clones share
/// state. Nothing survives the process; this is the default backend
/// and the one to use in tests.
#[derive(Debug, Clone)]
pub struct MemoryTokenStorage {
    slot: Arc<RwLock<Option<TokenSet>>>,
}

impl Default for MemoryTokenStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenStorage {
    /// Create a new empty MemoryTokenStorage.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a MemoryTokenStorage holding an initial token set.
    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(tokens))),
        }
    }

    /// Check if no token set is stored.
    pub fn is_empty(&self) -> bool {
        self.slot.read().expect("lock poisoned").is_none()
    }
}

impl TokenStorage for MemoryTokenStorage {
    #[instrument(skip(self))]
    fn load(&self) -> Option<TokenSet> {
        self.slot.read().expect("lock poisoned").clone()
    }

    #[instrument(skip(self, tokens))]
    fn save(&self, tokens: &TokenSet) {
        *self.slot.write().expect("lock poisoned") = Some(tokens.clone());
    }

    #[instrument(skip(self))]
    fn clear(&self) {
        *self.slot.write().expect("lock poisoned") = None;
    }

    fn name(&self) -> &str {
        "memory"
    }
}
