//! File-based token storage.

use std::path::{Path, PathBuf};

use tracing::{instrument, warn};

use super::{read_json_slot, remove_slot, write_json_slot, TokenStorage, TOKENS_FILE};
use crate::token::TokenSet;

/// Durable file-based token storage.
///
/// Stores the token set as JSON at `{dir}/tokens.json`, by default
/// under the user's configuration directory, so authentication survives
/// process restarts. When no configuration directory can be resolved
/// (containers without a home, stripped-down CI), the backend is
/// unavailable and every operation degrades to a no-op.
///
/// # Security
/// - Token files are written with 0600 permissions on Unix
/// - The storage directory is created with 0700 permissions
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    /// Path of the token file; `None` when no directory could be resolved.
    path: Option<PathBuf>,
}

impl Default for FileTokenStorage {
    fn default() -> Self {
        Self::default_location()
    }
}

impl FileTokenStorage {
    /// Create a FileTokenStorage rooted at the specified directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(dir.into().join(TOKENS_FILE)),
        }
    }

    /// Create a FileTokenStorage at the default platform location,
    /// `{config_dir}/xepeng-oauth/tokens.json`.
    pub fn default_location() -> Self {
        let path = super::default_dir().map(|dir| dir.join(TOKENS_FILE));
        if path.is_none() {
            warn!("No config directory available; file token storage is disabled");
        }
        Self { path }
    }

    /// Path of the token file, when the backend is available.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl TokenStorage for FileTokenStorage {
    #[instrument(skip(self))]
    fn load(&self) -> Option<TokenSet> {
        read_json_slot(self.path.as_deref()?)
    }

    #[instrument(skip(self, tokens))]
    fn save(&self, tokens: &TokenSet) {
        if let Some(path) = &self.path {
            write_json_slot(path, tokens);
        }
    }

    #[instrument(skip(self))]
    fn clear(&self) {
        if let Some(path) = &self.path {
            remove_slot(path);
        }
    }

    fn available(&self) -> bool {
        self.path.is_some()
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(access: &str) -> TokenSet {
        TokenSet::with_expires_at(access, Some("RT".into()), i64::MAX)
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path());

        assert!(storage.load().is_none());
        storage.save(&tokens("AT"));

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.access_token, "AT");
        assert!(dir.path().join("tokens.json").exists());
    }

    #[test]
    fn test_file_save_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path());

        storage.save(&tokens("first"));
        storage.save(&tokens("second"));
        assert_eq!(storage.load().unwrap().access_token, "second");
    }

    #[test]
    fn test_file_clear() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path());

        storage.save(&tokens("AT"));
        storage.clear();
        assert!(storage.load().is_none());
        assert!(!dir.path().join("tokens.json").exists());

        // Clearing an empty store is fine.
        storage.clear();
    }

    #[test]
    fn test_file_corrupt_content_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path());

        std::fs::write(dir.path().join("tokens.json"), "{broken").unwrap();
        assert!(storage.load().is_none());
    }

    #[test]
    fn test_file_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        FileTokenStorage::new(dir.path()).save(&tokens("AT"));

        let reopened = FileTokenStorage::new(dir.path());
        assert_eq!(reopened.load().unwrap().access_token, "AT");
    }

    #[test]
    fn test_file_unavailable_backend_noops() {
        let storage = FileTokenStorage { path: None };
        assert!(!storage.available());
        assert!(storage.load().is_none());
        storage.save(&tokens("AT"));
        assert!(storage.load().is_none());
        storage.clear();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("sub"));
        storage.save(&tokens("AT"));

        let file_mode = std::fs::metadata(storage.path().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);

        let dir_mode = std::fs::metadata(dir.path().join("sub"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(FileTokenStorage::new("/tmp").name(), "file");
    }
}
