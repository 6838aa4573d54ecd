//! Token storage backends.
//!
//! Each backend holds at most one [`TokenSet`]. Selection happens via
//! [`StorageKind`](crate::config::StorageKind) or by passing a custom
//! implementation to the client builder.
//!
//! Storage is infallible by contract: when the backing surface is
//! unusable (no resolvable directory, unreadable file, malformed JSON),
//! reads yield `None` and writes are swallowed, with the failure logged
//! at `warn`. Authentication then simply does not persist; it never
//! breaks the flow.

pub mod file;
pub mod memory;
pub mod session;

// Re-exports
pub use file::FileTokenStorage;
pub use memory::MemoryTokenStorage;
pub use session::SessionTokenStorage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::token::TokenSet;

/// Directory name used under the platform config/runtime directories.
pub(crate) const STORAGE_DIR_NAME: &str = "xepeng-oauth";

/// File name of the persisted token set.
pub(crate) const TOKENS_FILE: &str = "tokens.json";

/// File permissions for persisted files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Trait for token storage backends.
///
/// Implementations must be thread-safe (`Send + Sync`); the client and
/// its background refresh task share one instance. Operations never
/// fail: backends degrade to "no tokens" when their surface is
/// unusable.
pub trait TokenStorage: Send + Sync {
    /// Load the stored token set, if any.
    fn load(&self) -> Option<TokenSet>;

    /// Save a token set, replacing any previous one.
    fn save(&self, tokens: &TokenSet);

    /// Remove the stored token set.
    fn clear(&self);

    /// Whether the backing surface is usable. Unavailable backends
    /// no-op every operation.
    fn available(&self) -> bool {
        true
    }

    /// Get the name of this storage backend.
    fn name(&self) -> &str;
}

// Blanket implementation for Arc<T>
impl<T: TokenStorage + ?Sized> TokenStorage for Arc<T> {
    fn load(&self) -> Option<TokenSet> {
        (**self).load()
    }
    fn save(&self, tokens: &TokenSet) {
        (**self).save(tokens)
    }
    fn clear(&self) {
        (**self).clear()
    }
    fn available(&self) -> bool {
        (**self).available()
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// Blanket implementation for Box<T>
impl<T: TokenStorage + ?Sized> TokenStorage for Box<T> {
    fn load(&self) -> Option<TokenSet> {
        (**self).load()
    }
    fn save(&self, tokens: &TokenSet) {
        (**self).save(tokens)
    }
    fn clear(&self) {
        (**self).clear()
    }
    fn available(&self) -> bool {
        (**self).available()
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Default durable storage directory: `{config_dir}/xepeng-oauth`.
pub(crate) fn default_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(STORAGE_DIR_NAME))
}

/// Session storage directory: `{runtime_dir}/xepeng-oauth`, falling
/// back to the system temp directory on platforms without a runtime
/// directory.
pub(crate) fn session_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STORAGE_DIR_NAME)
}

// =============================================================================
// JSON file slot helpers
// =============================================================================

/// Read and deserialize a JSON value from `path`.
///
/// Missing files, unreadable files, empty content, and malformed JSON
/// all degrade to `None`.
pub(crate) fn read_json_slot<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read storage file");
            return None;
        }
    };

    if content.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse storage file");
            None
        }
    }
}

/// Serialize `value` as JSON and write it to `path` atomically.
///
/// Writes to a temp file first, then renames. On Unix the file is
/// created with 0600 permissions so tokens are never readable by other
/// users, not even briefly. Failures are logged and swallowed.
pub(crate) fn write_json_slot<T: serde::Serialize>(path: &Path, value: &T) {
    if !ensure_parent_dir(path) {
        return;
    }

    let content = match serde_json::to_string_pretty(value) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to serialize storage value");
            return;
        }
    };

    let temp_path = path.with_extension("tmp");
    if let Err(e) = write_temp_file(&temp_path, &content) {
        warn!(path = %temp_path.display(), error = %e, "Failed to write temp file");
        let _ = std::fs::remove_file(&temp_path);
        return;
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        warn!(path = %path.display(), error = %e, "Failed to replace storage file");
        let _ = std::fs::remove_file(&temp_path);
    }
}

/// Remove the file at `path`, treating absence as success.
pub(crate) fn remove_slot(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove storage file"),
    }
}

/// Ensure the parent directory of `path` exists with 0700 permissions.
fn ensure_parent_dir(path: &Path) -> bool {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => return true,
    };
    if dir.exists() {
        return true;
    }

    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "Failed to create storage directory");
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(DIR_MODE);
        if let Err(e) = std::fs::set_permissions(dir, perms) {
            warn!(dir = %dir.display(), error = %e, "Failed to set storage directory permissions");
        }
    }

    true
}

#[cfg(unix)]
fn write_temp_file(temp_path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(temp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_temp_file(temp_path: &Path, content: &str) -> std::io::Result<()> {
    std::fs::write(temp_path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenSet;

    #[test]
    fn test_slot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot.json");
        let tokens = TokenSet::with_expires_at("AT", Some("RT".into()), 1234);

        write_json_slot(&path, &tokens);
        let loaded: Option<TokenSet> = read_json_slot(&path);
        assert_eq!(loaded, Some(tokens));
    }

    #[test]
    fn test_slot_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<TokenSet> = read_json_slot(&dir.path().join("absent.json"));
        assert!(loaded.is_none());
    }

    #[test]
    fn test_slot_empty_and_corrupt_content() {
        let dir = tempfile::tempdir().unwrap();

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "  \n").unwrap();
        assert!(read_json_slot::<TokenSet>(&empty).is_none());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        assert!(read_json_slot::<TokenSet>(&corrupt).is_none());
    }

    #[test]
    fn test_slot_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/slot.json");
        let tokens = TokenSet::with_expires_at("AT", None, 1);

        write_json_slot(&path, &tokens);
        assert_eq!(read_json_slot::<TokenSet>(&path), Some(tokens));
    }

    #[cfg(unix)]
    #[test]
    fn test_slot_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot.json");
        write_json_slot(&path, &TokenSet::with_expires_at("AT", None, 1));

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "token file should be owner-only");
    }

    #[test]
    fn test_remove_slot_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot.json");
        write_json_slot(&path, &TokenSet::with_expires_at("AT", None, 1));

        remove_slot(&path);
        assert!(!path.exists());
        remove_slot(&path);
    }

    #[test]
    fn test_trait_object_through_arc_and_box() {
        let tokens = TokenSet::with_expires_at("AT", None, i64::MAX);

        let arc: Arc<dyn TokenStorage> = Arc::new(MemoryTokenStorage::new());
        arc.save(&tokens);
        assert_eq!(arc.load(), Some(tokens.clone()));
        assert_eq!(arc.name(), "memory");
        assert!(arc.available());

        let boxed: Box<dyn TokenStorage> = Box::new(MemoryTokenStorage::new());
        boxed.save(&tokens);
        assert_eq!(boxed.load(), Some(tokens));
        boxed.clear();
        assert!(boxed.load().is_none());
    }
}
