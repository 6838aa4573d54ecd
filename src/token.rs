//! Token data types.
//!
//! [`TokenSet`] is the persisted shape: an access token, an optional
//! refresh token, and an absolute expiry stamped at issuance.
//! [`TokenResponse`] is the wire shape returned by the token endpoint,
//! and [`UserInfo`] the profile returned by the userinfo endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

// =============================================================================
// TokenSet
// =============================================================================

/// A stored set of OAuth tokens.
///
/// `expires_at` is an absolute epoch-millisecond timestamp computed at
/// issuance as `now + expires_in * 1000`, so expiry checks never depend
/// on when the response was received. Serializes in camelCase for
/// compatibility with token files written by the platform's other SDKs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    /// Bearer token sent on API requests.
    pub access_token: String,

    /// Refresh token, when the server granted one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry in epoch milliseconds.
    pub expires_at: i64,
}

impl TokenSet {
    /// Build a token set from a token endpoint response, stamping the
    /// absolute expiry from the response's relative `expires_in`.
    #[must_use]
    pub fn from_response(response: &TokenResponse) -> Self {
        Self {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            expires_at: now_millis() + response.expires_in * 1000,
        }
    }

    /// Create a token set with an explicit expiry timestamp.
    #[must_use]
    pub fn with_expires_at(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
        }
    }

    /// Whether the expiry timestamp has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_millis() >= self.expires_at
    }

    /// Whether the token expires within `buffer_secs` from now.
    ///
    /// True for already-expired tokens.
    #[must_use]
    pub fn expires_within(&self, buffer_secs: u64) -> bool {
        now_millis() >= self.expires_at - (buffer_secs as i64) * 1000
    }

    /// Time remaining until expiry; zero when already expired.
    #[must_use]
    pub fn time_until_expiry(&self) -> Duration {
        let remaining = self.expires_at - now_millis();
        if remaining > 0 {
            Duration::from_millis(remaining as u64)
        } else {
            Duration::ZERO
        }
    }
}

// =============================================================================
// TokenResponse
// =============================================================================

/// Successful response from the token endpoint (RFC 6749 section 5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The issued access token.
    pub access_token: String,

    /// Refresh token, when the server issues one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Lifetime of the access token in seconds.
    pub expires_in: i64,

    /// Token type; defaults to "Bearer" when the server omits it.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Granted scopes, when the server reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

// =============================================================================
// UserInfo
// =============================================================================

/// User profile returned by the userinfo endpoint.
///
/// Only `sub` is guaranteed by the server; any claims beyond the known
/// fields are preserved in `claims`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Subject identifier, unique per user.
    pub sub: String,

    /// Email address, when the `email` scope was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name, when the `profile` scope was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Additional claims the server included.
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}
