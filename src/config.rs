//! Client configuration.
//!
//! [`OAuthConfig`] carries everything the client needs: the client
//! identity, the server base URLs, requested scopes, and the refresh
//! policy. Only `client_id` and `redirect_uri` are required; every
//! other field has a documented default, and the struct deserializes
//! from partial JSON/TOML so it can be embedded in application config
//! files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default authorization server base URL (Xepeng staging).
pub const DEFAULT_BASE_URL: &str = "https://staging-app.xepeng.com";

/// Default requested scopes.
pub const DEFAULT_SCOPES: &[&str] = &["profile", "email"];

/// Default refresh buffer in seconds (5 minutes).
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 300;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_refresh_buffer() -> u64 {
    DEFAULT_REFRESH_BUFFER_SECS
}

// =============================================================================
// OAuthConfig
// =============================================================================

/// OAuth client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth client identifier, sent on token and revocation requests.
    pub client_id: String,

    /// Client secret for confidential clients. Included in token
    /// requests when present; public clients leave this unset and rely
    /// on PKCE alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the authorization server.
    pub redirect_uri: String,

    /// Authorization server base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Separate base URL for token, userinfo, and revocation requests.
    /// Falls back to `base_url` when unset; set it when the API tier is
    /// served from a different host than the login pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,

    /// Scopes requested during authorization, space-joined in the URL.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Token storage backend.
    #[serde(default)]
    pub storage: StorageKind,

    /// Schedule a background refresh shortly before tokens expire.
    #[serde(default = "default_true")]
    pub auto_refresh: bool,

    /// Seconds before expiry at which a token counts as due for
    /// renewal. Bounds both the background timer and on-demand refresh.
    #[serde(default = "default_refresh_buffer")]
    pub refresh_buffer: u64,
}

impl OAuthConfig {
    /// Create a configuration with the documented defaults.
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            base_url: default_base_url(),
            api_base_url: None,
            scopes: default_scopes(),
            storage: StorageKind::default(),
            auto_refresh: true,
            refresh_buffer: DEFAULT_REFRESH_BUFFER_SECS,
        }
    }

    /// Set the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Set the authorization server base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set a separate base URL for token, userinfo, and revocation
    /// requests.
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Replace the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Select the token storage backend.
    #[must_use]
    pub fn with_storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Enable or disable the background refresh timer.
    #[must_use]
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// Set the refresh buffer in seconds.
    #[must_use]
    pub fn with_refresh_buffer(mut self, seconds: u64) -> Self {
        self.refresh_buffer = seconds;
        self
    }

    /// Base URL for token, userinfo, and revocation requests.
    pub fn api_base(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or(&self.base_url)
            .trim_end_matches('/')
    }

    /// URL of the authorization endpoint (always on `base_url`).
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth/authorize", self.base_url.trim_end_matches('/'))
    }

    /// URL of the token endpoint.
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.api_base())
    }

    /// URL of the userinfo endpoint.
    pub fn userinfo_endpoint(&self) -> String {
        format!("{}/oauth/userinfo", self.api_base())
    }

    /// URL of the revocation endpoint.
    pub fn revoke_endpoint(&self) -> String {
        format!("{}/oauth/revoke", self.api_base())
    }

    /// Space-joined scope string for the authorization request.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

// =============================================================================
// StorageKind
// =============================================================================

/// Token storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Process-memory storage, dropped with the client.
    #[default]
    Memory,
    /// Durable file storage under the user config directory.
    File,
    /// Storage scoped to the current login session.
    Session,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Memory => write!(f, "memory"),
            StorageKind::File => write!(f, "file"),
            StorageKind::Session => write!(f, "session"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StorageKind::Memory),
            "file" => Ok(StorageKind::File),
            "session" => Ok(StorageKind::Session),
            _ => Err(format!("Unknown storage kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OAuthConfig::new("c1", "https://app/cb");
        assert_eq!(config.client_id, "c1");
        assert_eq!(config.redirect_uri, "https://app/cb");
        assert_eq!(config.base_url, "https://staging-app.xepeng.com");
        assert!(config.client_secret.is_none());
        assert!(config.api_base_url.is_none());
        assert_eq!(config.scopes, vec!["profile", "email"]);
        assert_eq!(config.storage, StorageKind::Memory);
        assert!(config.auto_refresh);
        assert_eq!(config.refresh_buffer, 300);
    }

    #[test]
    fn test_builder_style_overrides() {
        let config = OAuthConfig::new("c1", "https://app/cb")
            .with_client_secret("shh")
            .with_base_url("https://auth.example")
            .with_api_base_url("https://api.example")
            .with_scopes(["openid"])
            .with_storage(StorageKind::File)
            .with_auto_refresh(false)
            .with_refresh_buffer(60);

        assert_eq!(config.client_secret.as_deref(), Some("shh"));
        assert_eq!(config.base_url, "https://auth.example");
        assert_eq!(config.api_base_url.as_deref(), Some("https://api.example"));
        assert_eq!(config.scopes, vec!["openid"]);
        assert_eq!(config.storage, StorageKind::File);
        assert!(!config.auto_refresh);
        assert_eq!(config.refresh_buffer, 60);
    }

    #[test]
    fn test_api_base_falls_back_to_base_url() {
        let config = OAuthConfig::new("c1", "https://app/cb").with_base_url("https://auth.example");
        assert_eq!(config.api_base(), "https://auth.example");
        assert_eq!(config.token_endpoint(), "https://auth.example/oauth/token");
        assert_eq!(
            config.authorize_endpoint(),
            "https://auth.example/oauth/authorize"
        );
    }

    #[test]
    fn test_api_base_override_splits_endpoints() {
        let config = OAuthConfig::new("c1", "https://app/cb")
            .with_base_url("https://auth.example")
            .with_api_base_url("https://api.example");

        // Authorization stays on the login host.
        assert_eq!(
            config.authorize_endpoint(),
            "https://auth.example/oauth/authorize"
        );
        // Backchannel requests move to the API host.
        assert_eq!(config.token_endpoint(), "https://api.example/oauth/token");
        assert_eq!(
            config.userinfo_endpoint(),
            "https://api.example/oauth/userinfo"
        );
        assert_eq!(config.revoke_endpoint(), "https://api.example/oauth/revoke");
    }

    #[test]
    fn test_trailing_slashes_trimmed() {
        let config = OAuthConfig::new("c1", "https://app/cb")
            .with_base_url("https://auth.example/")
            .with_api_base_url("https://api.example/");
        assert_eq!(
            config.authorize_endpoint(),
            "https://auth.example/oauth/authorize"
        );
        assert_eq!(config.token_endpoint(), "https://api.example/oauth/token");
    }

    #[test]
    fn test_scope_param() {
        let config = OAuthConfig::new("c1", "https://app/cb");
        assert_eq!(config.scope_param(), "profile email");

        let empty = config.with_scopes(Vec::<String>::new());
        assert_eq!(empty.scope_param(), "");
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: OAuthConfig = serde_json::from_str(
            r#"{"client_id":"c1","redirect_uri":"https://app/cb","storage":"session"}"#,
        )
        .unwrap();
        assert_eq!(config.client_id, "c1");
        assert_eq!(config.storage, StorageKind::Session);
        assert_eq!(config.base_url, "https://staging-app.xepeng.com");
        assert!(config.auto_refresh);
        assert_eq!(config.refresh_buffer, 300);
    }

    #[test]
    fn test_storage_kind_display_and_parse() {
        for kind in [StorageKind::Memory, StorageKind::File, StorageKind::Session] {
            let parsed: StorageKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("keyring".parse::<StorageKind>().is_err());
        assert_eq!(StorageKind::default(), StorageKind::Memory);
    }
}
