//! In-flight login attempt state.
//!
//! [`FlowState`] is the correlation record binding an authorization
//! request (anti-CSRF state, PKCE verifier and challenge, redirect URI)
//! to the callback that completes it. [`StateStore`] holds at most one
//! record: starting a new login overwrites the previous attempt, and
//! the record is consumed when a callback is processed, so one record
//! can never validate two callbacks.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::pkce;
use crate::storage::{read_json_slot, remove_slot, write_json_slot};

/// File name of the persisted correlation record.
pub(crate) const STATE_FILE: &str = "state.json";

// =============================================================================
// FlowState
// =============================================================================

/// Correlation record for an in-flight login attempt.
///
/// Persists in camelCase alongside the token file, so a flow started
/// before a process restart can still complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    /// Anti-CSRF state token, echoed back by the authorization server.
    pub state: String,

    /// PKCE code verifier, sent during token exchange.
    pub code_verifier: String,

    /// PKCE code challenge derived from the verifier.
    pub code_challenge: String,

    /// Redirect URI the flow was started with.
    pub redirect_uri: String,
}

impl FlowState {
    /// Generate a fresh record for a new login attempt.
    pub fn generate(redirect_uri: &str) -> crate::Result<Self> {
        let code_verifier = pkce::generate_verifier(pkce::DEFAULT_VERIFIER_LENGTH)?;
        let code_challenge = pkce::generate_challenge(&code_verifier);
        Ok(Self {
            state: pkce::generate_state(),
            code_verifier,
            code_challenge,
            redirect_uri: redirect_uri.to_string(),
        })
    }
}

// =============================================================================
// StateStore
// =============================================================================

/// Single-slot store for the correlation record.
///
/// Memory-backed for in-process flows; file-backed beside the token
/// file when the client uses durable storage. The slot semantics are
/// identical either way: `store` overwrites, `take` consumes.
#[derive(Debug)]
pub enum StateStore {
    /// In-process slot.
    Memory(Mutex<Option<FlowState>>),
    /// File slot at the given path.
    File(PathBuf),
    /// No usable surface; every operation is a no-op.
    Unavailable,
}

impl StateStore {
    /// Create an empty in-process store.
    pub fn memory() -> Self {
        Self::Memory(Mutex::new(None))
    }

    /// Create a file-backed store using `state.json` under `dir`.
    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self::File(dir.into().join(STATE_FILE))
    }

    /// Create a store that holds nothing and stores nothing.
    pub fn unavailable() -> Self {
        Self::Unavailable
    }

    /// Store a record, overwriting any prior attempt.
    pub fn store(&self, flow: FlowState) {
        match self {
            Self::Memory(slot) => *slot.lock().expect("lock poisoned") = Some(flow),
            Self::File(path) => write_json_slot(path, &flow),
            Self::Unavailable => {}
        }
    }

    /// Take the current record, consuming it.
    ///
    /// The record is removed before it is returned; a second call
    /// yields `None` until a new attempt is stored.
    pub fn take(&self) -> Option<FlowState> {
        match self {
            Self::Memory(slot) => slot.lock().expect("lock poisoned").take(),
            Self::File(path) => {
                let flow = read_json_slot(path)?;
                remove_slot(path);
                Some(flow)
            }
            Self::Unavailable => None,
        }
    }

    /// Peek at the stored state token without consuming the record.
    pub fn peek_state(&self) -> Option<String> {
        match self {
            Self::Memory(slot) => slot
                .lock()
                .expect("lock poisoned")
                .as_ref()
                .map(|flow| flow.state.clone()),
            Self::File(path) => read_json_slot::<FlowState>(path).map(|flow| flow.state),
            Self::Unavailable => None,
        }
    }

    /// Remove any stored record.
    pub fn clear(&self) {
        match self {
            Self::Memory(slot) => *slot.lock().expect("lock poisoned") = None,
            Self::File(path) => remove_slot(path),
            Self::Unavailable => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_shape() {
        let flow = FlowState::generate("https://app/cb").unwrap();
        assert_eq!(flow.state.len(), 43);
        assert_eq!(flow.code_verifier.len(), pkce::DEFAULT_VERIFIER_LENGTH);
        assert_eq!(
            flow.code_challenge,
            pkce::generate_challenge(&flow.code_verifier)
        );
        assert_eq!(flow.redirect_uri, "https://app/cb");
    }

    #[test]
    fn test_generate_unique() {
        let first = FlowState::generate("https://app/cb").unwrap();
        let second = FlowState::generate("https://app/cb").unwrap();
        assert_ne!(first.state, second.state);
        assert_ne!(first.code_verifier, second.code_verifier);
    }

    #[test]
    fn test_flow_state_serializes_camel_case() {
        let flow = FlowState {
            state: "s".into(),
            code_verifier: "v".into(),
            code_challenge: "c".into(),
            redirect_uri: "https://app/cb".into(),
        };
        let json = serde_json::to_value(&flow).unwrap();
        assert_eq!(json["state"], "s");
        assert_eq!(json["codeVerifier"], "v");
        assert_eq!(json["codeChallenge"], "c");
        assert_eq!(json["redirectUri"], "https://app/cb");
    }

    #[test]
    fn test_memory_take_is_destructive() {
        let store = StateStore::memory();
        let flow = FlowState::generate("https://app/cb").unwrap();
        store.store(flow.clone());

        assert_eq!(store.take(), Some(flow));
        assert!(store.take().is_none());
    }

    #[test]
    fn test_memory_store_overwrites() {
        let store = StateStore::memory();
        let first = FlowState::generate("https://app/cb").unwrap();
        let second = FlowState::generate("https://app/cb").unwrap();

        store.store(first);
        store.store(second.clone());
        assert_eq!(store.take(), Some(second));
    }

    #[test]
    fn test_memory_peek_does_not_consume() {
        let store = StateStore::memory();
        let flow = FlowState::generate("https://app/cb").unwrap();
        store.store(flow.clone());

        assert_eq!(store.peek_state().as_deref(), Some(flow.state.as_str()));
        assert_eq!(store.take(), Some(flow));
    }

    #[test]
    fn test_memory_clear() {
        let store = StateStore::memory();
        store.store(FlowState::generate("https://app/cb").unwrap());
        store.clear();
        assert!(store.take().is_none());
    }

    #[test]
    fn test_file_take_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::file(dir.path());
        let flow = FlowState::generate("https://app/cb").unwrap();

        store.store(flow.clone());
        assert!(dir.path().join(STATE_FILE).exists());

        assert_eq!(store.take(), Some(flow));
        assert!(!dir.path().join(STATE_FILE).exists());
        assert!(store.take().is_none());
    }

    #[test]
    fn test_file_peek_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::file(dir.path());
        let flow = FlowState::generate("https://app/cb").unwrap();

        store.store(flow.clone());
        assert_eq!(store.peek_state().as_deref(), Some(flow.state.as_str()));

        store.clear();
        assert!(store.peek_state().is_none());
    }

    #[test]
    fn test_unavailable_noops() {
        let store = StateStore::unavailable();
        store.store(FlowState::generate("https://app/cb").unwrap());
        assert!(store.peek_state().is_none());
        assert!(store.take().is_none());
        store.clear();
    }
}
