//! # xepeng-oauth
//!
//! OAuth 2.0 authorization code + PKCE client for the Xepeng platform.
//!
//! The crate drives the full token lifecycle: building the
//! authorization URL, validating the browser callback, exchanging the
//! code, persisting tokens through a pluggable storage backend, and
//! keeping the access token fresh with buffered on-demand and
//! background refresh.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use xepeng_oauth::{OAuthClient, OAuthConfig};
//!
//! # async fn run() -> xepeng_oauth::Result<()> {
//! let config = OAuthConfig::new("my-client-id", "http://localhost:8912/callback");
//! let client = OAuthClient::new(config);
//!
//! // 1. Send the user to the authorization page.
//! let url = client.authorization_url()?;
//! println!("Open in browser: {}", url);
//!
//! // 2. Hand the redirect back once the browser returns.
//! let callback = "http://localhost:8912/callback?code=...&state=...";
//! client.handle_callback(Some(callback)).await?;
//!
//! // 3. From here on, this is the only call that matters.
//! let token = client.get_access_token().await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage
//!
//! Tokens persist through the [`TokenStorage`] trait. Three backends
//! ship with the crate: in-memory (default), file-backed under the
//! user config directory, and session-scoped under the runtime
//! directory. Select one via [`OAuthConfig::with_storage`], or inject
//! your own implementation through [`OAuthClient::builder`].

pub mod client;
pub mod config;
pub mod error;
pub mod pkce;
pub mod state;
pub mod storage;
pub mod token;

// Re-exports for ergonomic usage
pub use client::{AuthStatus, OAuthClient, OAuthClientBuilder};
pub use config::{OAuthConfig, StorageKind};
pub use error::{Error, Result};
pub use state::FlowState;
pub use storage::{
    FileTokenStorage, MemoryTokenStorage, SessionTokenStorage, TokenStorage,
};
pub use token::{TokenResponse, TokenSet, UserInfo};
