//! OAuth client orchestration.
//!
//! [`OAuthClient`] drives the complete authorization code + PKCE
//! lifecycle against the platform endpoints:
//!
//! 1. [`authorization_url`](OAuthClient::authorization_url) generates
//!    PKCE material, parks it in the single-slot state store, and
//!    returns the URL to open in a browser.
//! 2. [`handle_callback`](OAuthClient::handle_callback) validates the
//!    redirect (server errors, state echo) and exchanges the code.
//! 3. Tokens persist through the configured
//!    [`TokenStorage`](crate::storage::TokenStorage); with
//!    `auto_refresh` on, a one-shot background task renews them
//!    shortly before expiry.
//! 4. [`get_access_token`](OAuthClient::get_access_token) hands out a
//!    token guaranteed fresh for at least the refresh buffer,
//!    refreshing on demand. Concurrent callers share one refresh.
//!
//! The client is a cheap handle: clones share one inner state, and all
//! operations take `&self`, so it can be stored once and used from any
//! task.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{OAuthConfig, StorageKind};
use crate::error::{Error, Result};
use crate::state::{FlowState, StateStore};
use crate::storage::{
    self, FileTokenStorage, MemoryTokenStorage, SessionTokenStorage, TokenStorage,
};
use crate::token::{now_millis, TokenResponse, TokenSet, UserInfo};

/// Timeout applied to the default HTTP client.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// AuthStatus
// =============================================================================

/// Snapshot of the current authentication state.
///
/// Computed locally from stored tokens; building one never touches the
/// network.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthStatus {
    /// Whether a token set exists and has not expired.
    pub authenticated: bool,
    /// Whether the token is inside the refresh buffer.
    pub needs_refresh: bool,
    /// Whether the session can renew itself without a new login.
    pub has_refresh_token: bool,
    /// Seconds until the access token expires (None when not authenticated).
    pub expires_in_secs: Option<u64>,
}

// =============================================================================
// Wire shapes
// =============================================================================

/// Error body of a failed token request.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Query parameters extracted from the callback URL.
#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            // Empty values count as absent.
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

// =============================================================================
// Inner state
// =============================================================================

/// Pending auto-refresh timer.
///
/// The sequence number identifies the most recent arm; a firing task
/// whose sequence is stale was superseded (re-arm or logout) and must
/// do nothing.
#[derive(Default)]
struct RefreshTimer {
    seq: u64,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    config: OAuthConfig,
    http: reqwest::Client,
    storage: Arc<dyn TokenStorage>,
    state_store: StateStore,
    timer: Mutex<RefreshTimer>,
    /// Serializes every token-refreshing path, so N concurrent callers
    /// produce at most one network request.
    refresh_gate: tokio::sync::Mutex<()>,
    /// Latest token set; receivers wake on replace and on clear.
    notify: watch::Sender<Option<TokenSet>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(handle) = timer.handle.take() {
                handle.abort();
            }
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`OAuthClient`].
///
/// Lets embedders swap in a custom storage backend or a pre-configured
/// HTTP client; plain construction goes through [`OAuthClient::new`].
pub struct OAuthClientBuilder {
    config: OAuthConfig,
    storage: Option<Arc<dyn TokenStorage>>,
    http: Option<reqwest::Client>,
}

impl OAuthClientBuilder {
    /// Start building a client for the given configuration.
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            storage: None,
            http: None,
        }
    }

    /// Use a custom token storage backend instead of the configured
    /// kind. The correlation record for in-flight logins then stays in
    /// process memory.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a pre-configured HTTP client (custom proxy, TLS, timeouts).
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the client.
    pub fn build(self) -> OAuthClient {
        let (storage, state_store) = match self.storage {
            Some(storage) => (storage, StateStore::memory()),
            None => backend_for_kind(&self.config),
        };
        let http = self.http.unwrap_or_else(default_http_client);

        let initial = storage.load();
        let (notify, _) = watch::channel(initial);

        debug!(storage = storage.name(), "OAuth client created");
        OAuthClient {
            inner: Arc::new(Inner {
                config: self.config,
                http,
                storage,
                state_store,
                timer: Mutex::new(RefreshTimer::default()),
                refresh_gate: tokio::sync::Mutex::new(()),
                notify,
            }),
        }
    }
}

fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("xepeng-oauth/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Map the configured storage kind to a token backend and a matching
/// slot for the correlation record, so both live on the same surface.
fn backend_for_kind(config: &OAuthConfig) -> (Arc<dyn TokenStorage>, StateStore) {
    match config.storage {
        StorageKind::Memory => (Arc::new(MemoryTokenStorage::new()), StateStore::memory()),
        StorageKind::File => match storage::default_dir() {
            Some(dir) => (Arc::new(FileTokenStorage::new(&dir)), StateStore::file(dir)),
            None => (
                Arc::new(FileTokenStorage::default_location()),
                StateStore::unavailable(),
            ),
        },
        StorageKind::Session => {
            let dir = storage::session_dir();
            (
                Arc::new(SessionTokenStorage::new(&dir)),
                StateStore::file(dir),
            )
        }
    }
}

// =============================================================================
// OAuthClient
// =============================================================================

/// Client for the platform's OAuth 2.0 authorization code + PKCE flow.
#[derive(Clone)]
pub struct OAuthClient {
    inner: Arc<Inner>,
}

impl OAuthClient {
    /// Create a client using the storage backend named in the
    /// configuration.
    pub fn new(config: OAuthConfig) -> Self {
        OAuthClientBuilder::new(config).build()
    }

    /// Start building a client with custom storage or HTTP settings.
    pub fn builder(config: OAuthConfig) -> OAuthClientBuilder {
        OAuthClientBuilder::new(config)
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &OAuthConfig {
        &self.inner.config
    }

    /// The token storage backend in use.
    pub fn storage(&self) -> Arc<dyn TokenStorage> {
        self.inner.storage.clone()
    }

    // =========================================================================
    // Flow: authorization URL + callback
    // =========================================================================

    /// Start a login attempt and return the authorization URL to open.
    ///
    /// Generates fresh PKCE material and an anti-CSRF state token, and
    /// parks them in the state store until the callback arrives.
    /// Calling this again abandons any unconsumed previous attempt.
    pub fn authorization_url(&self) -> Result<String> {
        let config = &self.inner.config;
        let flow = FlowState::generate(&config.redirect_uri)?;

        let url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            config.authorize_endpoint(),
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_uri),
            urlencoding::encode(&config.scope_param()),
            urlencoding::encode(&flow.state),
            urlencoding::encode(&flow.code_challenge),
        );

        self.inner.state_store.store(flow);
        info!("Started OAuth flow");
        Ok(url)
    }

    /// Complete a login attempt from the callback redirect.
    ///
    /// The embedding environment supplies the URL it received, via a
    /// loopback listener, a deep link, or a server route; `None` means
    /// no URL could be discovered and fails with `missing_url`. Errors
    /// reported by the authorization server are forwarded with the
    /// server's own code. The state echo is checked against the stored
    /// attempt before any network call, and the stored attempt is
    /// consumed even on mismatch, so a callback URL can never be
    /// replayed.
    pub async fn handle_callback(&self, callback_url: Option<&str>) -> Result<TokenResponse> {
        let raw = callback_url.ok_or(Error::MissingUrl)?;
        let url = Url::parse(raw)
            .map_err(|e| Error::InvalidCallback(format!("Malformed callback URL: {}", e)))?;

        let params = CallbackParams::from_url(&url);

        // Server-reported errors take priority over anything else. The
        // code doubles as the message when no description came back.
        if let Some(code) = params.error {
            let message = params.error_description.unwrap_or_else(|| code.clone());
            warn!(error = %code, "Authorization server returned an error");
            return Err(Error::AuthorizationDenied { code, message });
        }

        let (code, state) = match (params.code, params.state) {
            (Some(code), Some(state)) => (code, state),
            _ => {
                return Err(Error::InvalidCallback(
                    "Missing code or state parameter in callback URL".to_string(),
                ))
            }
        };

        // State tokens are single-use: the record is consumed here,
        // before comparison, so a second attempt finds nothing.
        match self.inner.state_store.take() {
            Some(flow) if flow.state == state => {
                debug!("Callback state validated");
                self.exchange_code(&code, &flow.code_verifier).await
            }
            Some(_) => {
                warn!("Callback state does not match stored login attempt");
                Err(Error::InvalidState)
            }
            None => {
                warn!("No stored login attempt for callback");
                Err(Error::InvalidState)
            }
        }
    }

    /// State token of the unconsumed login attempt, if one is parked.
    pub fn pending_state(&self) -> Option<String> {
        self.inner.state_store.peek_state()
    }

    // =========================================================================
    // Token exchange and refresh
    // =========================================================================

    /// Exchange an authorization code for tokens.
    ///
    /// Persists the result (storage write, subscriber notification,
    /// refresh timer) before returning the raw response.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse> {
        let config = &self.inner.config;

        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", config.redirect_uri.clone()),
            ("client_id", config.client_id.clone()),
        ];
        if let Some(secret) = &config.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        form.push(("code_verifier", verifier.to_string()));

        let response = self.token_request(&form).await?;
        self.persist_tokens(&response);
        info!("OAuth flow completed, tokens stored");
        Ok(response)
    }

    /// Refresh the access token using the stored refresh token.
    ///
    /// Fails with `no_refresh_token` when no tokens are stored or the
    /// stored set has no refresh token. Serialized against every other
    /// refreshing path.
    pub async fn refresh_access_token(&self) -> Result<TokenResponse> {
        let _gate = self.inner.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Perform the refresh request. Caller must hold the refresh gate.
    async fn refresh_locked(&self) -> Result<TokenResponse> {
        let tokens = self.inner.storage.load().ok_or(Error::NoRefreshToken)?;
        let refresh_token = tokens.refresh_token.ok_or(Error::NoRefreshToken)?;

        let config = &self.inner.config;
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
            ("client_id", config.client_id.clone()),
        ];
        if let Some(secret) = &config.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let response = self.token_request(&form).await?;
        self.persist_tokens(&response);
        debug!("Token refreshed successfully");
        Ok(response)
    }

    /// Get an access token guaranteed fresh for at least the refresh
    /// buffer.
    ///
    /// Returns the stored token when it has life left, otherwise
    /// refreshes first. Concurrent callers share one refresh: the gate
    /// serializes them, and the freshness re-check lets followers
    /// return the token the first caller fetched.
    pub async fn get_access_token(&self) -> Result<String> {
        let tokens = self.inner.storage.load().ok_or(Error::NotAuthenticated)?;
        if !tokens.expires_within(self.inner.config.refresh_buffer) {
            return Ok(tokens.access_token);
        }

        let _gate = self.inner.refresh_gate.lock().await;

        // Re-check under the gate: a refresh that completed while we
        // waited already renewed the stored set.
        if let Some(tokens) = self.inner.storage.load() {
            if !tokens.expires_within(self.inner.config.refresh_buffer) {
                return Ok(tokens.access_token);
            }
        }

        debug!("Token needs refresh, refreshing...");
        let response = self.refresh_locked().await?;
        Ok(response.access_token)
    }

    /// POST a form to the token endpoint and parse the response.
    async fn token_request(&self, form: &[(&str, String)]) -> Result<TokenResponse> {
        let endpoint = self.inner.config.token_endpoint();
        let response = self.inner.http.post(&endpoint).form(form).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Pull code/message out of the JSON error body when there
            // is one; anything unparseable gets the generic fallbacks.
            let parsed: TokenErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let code = parsed.error.unwrap_or_else(|| "token_error".to_string());
            let message = parsed
                .message
                .unwrap_or_else(|| "Token request failed".to_string());
            warn!(status = status.as_u16(), error = %code, "Token request failed");
            return Err(Error::ExchangeFailed {
                code,
                message,
                status: status.as_u16(),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::InvalidResponse(format!("Failed to parse token response: {}", e)))
    }

    /// Store a token response and schedule its renewal.
    ///
    /// Shared tail of exchange and refresh: stamps the absolute expiry,
    /// replaces the persisted set, publishes it to subscribers, and
    /// (re)arms the refresh timer when enabled and renewable.
    fn persist_tokens(&self, response: &TokenResponse) {
        let tokens = TokenSet::from_response(response);
        self.inner.storage.save(&tokens);
        // send_replace stores the value even with no receivers alive,
        // so a later subscriber still starts from the current set.
        self.inner.notify.send_replace(Some(tokens.clone()));

        if self.inner.config.auto_refresh && tokens.refresh_token.is_some() {
            self.arm_refresh_timer(&tokens);
        }
    }

    /// Schedule a one-shot background refresh at
    /// `expires_at - refresh_buffer`, replacing any pending timer.
    ///
    /// A non-positive delay arms nothing: the token is already inside
    /// the buffer, and the next `get_access_token` call refreshes it
    /// on demand.
    fn arm_refresh_timer(&self, tokens: &TokenSet) {
        let buffer_ms = (self.inner.config.refresh_buffer as i64) * 1000;
        let delay_ms = tokens.expires_at - now_millis() - buffer_ms;

        let mut timer = self.inner.timer.lock().expect("lock poisoned");
        timer.seq += 1;
        if let Some(previous) = timer.handle.take() {
            previous.abort();
        }

        if delay_ms <= 0 {
            debug!(delay_ms, "Token already inside refresh buffer, no timer armed");
            return;
        }

        let seq = timer.seq;
        let weak = Arc::downgrade(&self.inner);
        timer.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
            run_scheduled_refresh(weak, seq).await;
        }));
        debug!(delay_ms, "Auto-refresh timer armed");
    }

    fn cancel_refresh_timer(&self) {
        let mut timer = self.inner.timer.lock().expect("lock poisoned");
        timer.seq += 1;
        if let Some(handle) = timer.handle.take() {
            handle.abort();
        }
    }

    // =========================================================================
    // Session queries and teardown
    // =========================================================================

    /// Fetch the user profile from the userinfo endpoint.
    ///
    /// Requires stored tokens; the stored access token is sent as-is,
    /// without a freshness check.
    pub async fn get_user_info(&self) -> Result<UserInfo> {
        let tokens = self.inner.storage.load().ok_or(Error::NotAuthenticated)?;

        let endpoint = self.inner.config.userinfo_endpoint();
        let response = self
            .inner
            .http
            .get(&endpoint)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Userinfo request failed");
            return Err(Error::UserInfoFailed {
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|e| {
            Error::InvalidResponse(format!("Failed to parse userinfo response: {}", e))
        })
    }

    /// Revoke tokens server-side, then clear local state.
    ///
    /// Does nothing when unauthenticated. The revocation request is
    /// best-effort: failures (including transport errors) are logged
    /// and ignored, and local logout always follows.
    pub async fn revoke_tokens(&self) {
        let tokens = match self.inner.storage.load() {
            Some(tokens) => tokens,
            None => return,
        };

        let endpoint = self.inner.config.revoke_endpoint();
        let body = serde_json::json!({ "client_id": self.inner.config.client_id });
        let result = self
            .inner
            .http
            .post(&endpoint)
            .bearer_auth(&tokens.access_token)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Tokens revoked server-side")
            }
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Token revocation returned an error")
            }
            Err(e) => warn!(error = %e, "Token revocation request failed"),
        }

        self.logout();
    }

    /// Whether a token set exists and has not expired.
    ///
    /// Purely local; never triggers a refresh.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .storage
            .load()
            .is_some_and(|tokens| !tokens.is_expired())
    }

    /// The stored token set, if any. Does not refresh.
    pub fn get_tokens(&self) -> Option<TokenSet> {
        self.inner.storage.load()
    }

    /// Snapshot of the current authentication state.
    pub fn status(&self) -> AuthStatus {
        match self.inner.storage.load() {
            Some(tokens) => AuthStatus {
                authenticated: !tokens.is_expired(),
                needs_refresh: tokens.expires_within(self.inner.config.refresh_buffer),
                has_refresh_token: tokens.refresh_token.is_some(),
                expires_in_secs: Some(tokens.time_until_expiry().as_secs()),
            },
            None => AuthStatus {
                authenticated: false,
                needs_refresh: false,
                has_refresh_token: false,
                expires_in_secs: None,
            },
        }
    }

    /// Subscribe to token lifecycle changes.
    ///
    /// The receiver holds the current token set and wakes whenever it
    /// is replaced (exchange, refresh) or cleared (logout, revoke).
    pub fn subscribe(&self) -> watch::Receiver<Option<TokenSet>> {
        self.inner.notify.subscribe()
    }

    /// Clear local session state.
    ///
    /// Removes stored tokens, cancels any pending refresh timer,
    /// discards the in-flight login attempt, and notifies subscribers.
    /// Idempotent; never touches the network.
    pub fn logout(&self) {
        self.inner.storage.clear();
        self.cancel_refresh_timer();
        self.inner.state_store.clear();
        self.inner.notify.send_replace(None);
        info!("Logged out");
    }
}

/// Body of the auto-refresh timer task.
///
/// Holds only a weak reference, so a dropped client cannot be kept
/// alive by its own timer. The task re-checks the arm sequence under
/// the timer lock and removes its own handle before refreshing, so the
/// re-arm performed by a successful refresh does not abort the task
/// doing the refreshing.
async fn run_scheduled_refresh(inner: Weak<Inner>, seq: u64) {
    let inner = match inner.upgrade() {
        Some(inner) => inner,
        None => return,
    };

    {
        let mut timer = inner.timer.lock().expect("lock poisoned");
        if timer.seq != seq {
            // Superseded by a newer arm or a logout.
            return;
        }
        timer.handle = None;
    }

    let client = OAuthClient { inner };
    let _gate = client.inner.refresh_gate.lock().await;
    match client.refresh_locked().await {
        Ok(_) => debug!("Background token refresh completed"),
        Err(e) => warn!(error = %e, "Background token refresh failed"),
    }
}
