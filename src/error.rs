//! Error types for OAuth operations.
//!
//! Every failure surfaces as [`Error`]. Alongside the human-readable
//! `Display` message, each error carries a stable machine-readable code
//! ([`Error::code`]) that embedders can match on without parsing
//! message text. Errors reported by the authorization server itself
//! (`access_denied`, `invalid_grant`, ...) keep the server's code.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during OAuth operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No callback URL was provided and none could be discovered.
    #[error("No callback URL available")]
    MissingUrl,

    /// The callback URL is malformed or lacks required parameters.
    #[error("{0}")]
    InvalidCallback(String),

    /// Callback state does not match the stored login attempt (possible CSRF).
    #[error("Invalid state parameter")]
    InvalidState,

    /// Requested verifier length is outside the RFC 7636 bounds.
    #[error("Code verifier length must be between 43 and 128 characters, got {0}")]
    InvalidLength(usize),

    /// A refresh was requested but no refresh token is stored.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// An operation that requires stored tokens found none.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The authorization server redirected back with an error.
    #[error("{message}")]
    AuthorizationDenied {
        /// Error code reported by the server (e.g. `access_denied`).
        code: String,
        /// Human-readable description from the server, when provided.
        message: String,
    },

    /// The token endpoint rejected an exchange or refresh request.
    #[error("{message}")]
    ExchangeFailed {
        /// Error code from the response body, or `token_error`.
        code: String,
        /// Message from the response body, or a generic fallback.
        message: String,
        /// HTTP status of the failed response.
        status: u16,
    },

    /// The userinfo endpoint returned a non-success status.
    #[error("Failed to fetch user info (HTTP {status})")]
    UserInfoFailed {
        /// HTTP status of the failed response.
        status: u16,
    },

    /// A response body could not be parsed.
    #[error("{0}")]
    InvalidResponse(String),

    /// HTTP client error (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Stable machine-readable code for this error.
    ///
    /// Server-originated errors forward the server's own code; every
    /// other variant maps to a fixed string.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Error::MissingUrl => "missing_url",
            Error::InvalidCallback(_) => "invalid_callback",
            Error::InvalidState => "invalid_state",
            Error::InvalidLength(_) => "invalid_length",
            Error::NoRefreshToken => "no_refresh_token",
            Error::NotAuthenticated => "not_authenticated",
            Error::AuthorizationDenied { code, .. } => code,
            Error::ExchangeFailed { code, .. } => code,
            Error::UserInfoFailed { .. } => "userinfo_failed",
            Error::InvalidResponse(_) => "invalid_response",
            Error::Http(_) => "network_error",
        }
    }

    /// HTTP status associated with this error, when one exists.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::ExchangeFailed { status, .. } => Some(*status),
            Error::UserInfoFailed { status } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
