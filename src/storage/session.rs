//! Session-scoped token storage.

use std::path::{Path, PathBuf};

use tracing::instrument;

use super::{read_json_slot, remove_slot, write_json_slot, TokenStorage, TOKENS_FILE};
use crate::token::TokenSet;

/// Token storage scoped to the current login session.
///
/// The native analogue of per-session browser storage: tokens are kept
/// under the user's runtime directory (`$XDG_RUNTIME_DIR` on Linux),
/// which the OS clears when the login session ends. Platforms without a
/// runtime directory fall back to the system temp directory, which is
/// typically cleared on reboot.
///
/// Files get the same 0600/0700 treatment as
/// [`FileTokenStorage`](super::FileTokenStorage), which also keeps the
/// directory private when the fallback lands in a shared temp dir.
#[derive(Debug, Clone)]
pub struct SessionTokenStorage {
    path: PathBuf,
}

impl Default for SessionTokenStorage {
    fn default() -> Self {
        Self::default_location()
    }
}

impl SessionTokenStorage {
    /// Create a SessionTokenStorage rooted at the specified directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(TOKENS_FILE),
        }
    }

    /// Create a SessionTokenStorage at the default platform location,
    /// `{runtime_dir}/xepeng-oauth/tokens.json`.
    pub fn default_location() -> Self {
        Self::new(super::session_dir())
    }

    /// Path of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStorage for SessionTokenStorage {
    #[instrument(skip(self))]
    fn load(&self) -> Option<TokenSet> {
        read_json_slot(&self.path)
    }

    #[instrument(skip(self, tokens))]
    fn save(&self, tokens: &TokenSet) {
        write_json_slot(&self.path, tokens);
    }

    #[instrument(skip(self))]
    fn clear(&self) {
        remove_slot(&self.path);
    }

    fn name(&self) -> &str {
        "session"
    }
}
