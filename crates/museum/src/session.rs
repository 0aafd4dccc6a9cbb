// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth session lifecycle: login initiation, callback handling, proactive
//! refresh, and disconnect.
//!
//! The manager owns the in-memory session. The store holds a persisted copy
//! that is written on every change and read at startup or on external change.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use crate::location::{query_param, strip_query_params, Location};
use crate::model::{AuthSession, PendingAuthorization};
use crate::pkce::{self, AuthorizeRequest, DigestProvider};
use crate::store::Store;
use crate::token::TokenClient;

pub const DEFAULT_SCOPES: [&str; 2] = ["playlist-read-private", "playlist-read-collaborative"];

/// How long before expiry a refresh is attempted.
pub const REFRESH_MARGIN_MS: u64 = 60_000;

const STATUS_NOT_CONFIGURED: &str = "Spotify client id / redirect URI is not configured";
const STATUS_CONNECTING: &str = "Connecting to Spotify...";
const STATUS_CONNECTED: &str = "Spotify connection established.";
const STATUS_DISCONNECTED: &str = "Spotify connection removed.";

/// Provider endpoints and client registration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    pub authorize_url: Url,
    pub token_url: Url,
}

impl AuthConfig {
    /// Endpoints under an accounts host (`/authorize`, `/api/token`), default
    /// scopes, and no client registration.
    pub fn for_accounts(accounts: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client_id: None,
            redirect_uri: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_owned()).collect(),
            authorize_url: accounts.join("/authorize")?,
            token_url: accounts.join("/api/token")?,
        })
    }

    fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref().filter(|s| !s.is_empty())
    }

    fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref().filter(|s| !s.is_empty())
    }
}

/// Observable auth state. `Expired` is derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Disconnected,
    PendingCallback,
    Connected,
    Expired,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::PendingCallback => "pending_callback",
            Self::Connected => "connected",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast on every session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Connected { expires_at: u64 },
    Refreshed { expires_at: u64 },
    RefreshFailed { error: String },
    Disconnected,
    Status(String),
}

/// What a callback location turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Neither `code` nor `error` present.
    NotACallback,
    /// The provider redirected back with `error=<reason>`.
    ProviderError(String),
    Connected,
}

#[derive(Default)]
struct Inner {
    session: Option<AuthSession>,
    refresh_cancel: Option<CancellationToken>,
    status: Option<String>,
    /// Bumped on every in-memory session change.
    revision: u64,
    /// Last revision known to match the store.
    persisted: u64,
}

/// Owns the authoritative in-memory session.
pub struct SessionManager {
    config: AuthConfig,
    store: Store,
    tokens: TokenClient,
    location: Arc<dyn Location>,
    clock: Arc<dyn Clock>,
    digest: DigestProvider,
    inner: Mutex<Inner>,
    event_tx: broadcast::Sender<AuthEvent>,
    token_tx: watch::Sender<Option<String>>,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(
        config: AuthConfig,
        store: Store,
        tokens: TokenClient,
        location: Arc<dyn Location>,
    ) -> Arc<Self> {
        Self::with_parts(config, store, tokens, location, Arc::new(SystemClock), DigestProvider::Sha256)
    }

    pub fn with_parts(
        config: AuthConfig,
        store: Store,
        tokens: TokenClient,
        location: Arc<dyn Location>,
        clock: Arc<dyn Clock>,
        digest: DigestProvider,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        let (token_tx, _) = watch::channel(None);
        Arc::new(Self {
            config,
            store,
            tokens,
            location,
            clock,
            digest,
            inner: Mutex::new(Inner::default()),
            event_tx,
            token_tx,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.event_tx.subscribe()
    }

    /// Current access token; changes only when the token itself changes.
    pub fn watch_token(&self) -> watch::Receiver<Option<String>> {
        self.token_tx.subscribe()
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.inner.lock().session.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.lock().session.as_ref().map(|s| s.access_token.clone())
    }

    pub fn status_message(&self) -> Option<String> {
        self.inner.lock().status.clone()
    }

    pub fn state(&self) -> AuthState {
        if let Some(session) = self.session() {
            if session.is_expired(self.clock.now_ms()) {
                return AuthState::Expired;
            }
            return AuthState::Connected;
        }
        if self.store.get_pending().is_some() {
            AuthState::PendingCallback
        } else {
            AuthState::Disconnected
        }
    }

    /// Whether a refresh timer is currently armed.
    pub fn refresh_armed(&self) -> bool {
        self.inner.lock().refresh_cancel.as_ref().is_some_and(|c| !c.is_cancelled())
    }

    // -- Startup ----------------------------------------------------------------

    /// Adopt the persisted session, if any, and arm its refresh.
    pub fn restore(self: &Arc<Self>) -> Option<AuthSession> {
        let session = self.store.get_auth()?;
        debug!(expires_at = session.expires_at, "restored persisted session");
        self.install(session.clone(), true);
        Some(session)
    }

    /// Re-read the persisted session after an external change.
    ///
    /// A different record replaces the in-memory session; a missing record
    /// disconnects in memory without touching the store. Skipped while a
    /// local change is still being written, since the store is behind then.
    pub fn reload_from_store(self: &Arc<Self>) {
        let revision = {
            let inner = self.inner.lock();
            if inner.persisted != inner.revision {
                debug!("local session change not yet persisted, skipping reload");
                return;
            }
            inner.revision
        };
        let stored = self.store.get_auth();

        let (armed, event) = {
            let mut inner = self.inner.lock();
            if inner.revision != revision || inner.session == stored {
                return;
            }
            let event = match &stored {
                Some(session) => AuthEvent::Connected { expires_at: session.expires_at },
                None => AuthEvent::Disconnected,
            };
            let expires_at = stored.as_ref().map(|s| s.expires_at);
            let armed = self.replace_locked(&mut inner, stored);
            inner.persisted = inner.revision;
            (armed.zip(expires_at), event)
        };

        match event {
            AuthEvent::Disconnected => info!("persisted session removed externally"),
            _ => info!("persisted session changed externally"),
        }
        if let Some((cancel, expires_at)) = armed {
            self.spawn_refresh(cancel, expires_at);
        }
        self.emit(event);
    }

    // -- Login ------------------------------------------------------------------

    /// Create PKCE state, persist it, and hand the authorize URL to the
    /// location. No network call is made.
    pub fn initiate_login(&self) -> Result<Url, AuthError> {
        let (Some(client_id), Some(redirect_uri)) =
            (self.config.client_id(), self.config.redirect_uri())
        else {
            self.set_status(STATUS_NOT_CONFIGURED);
            return Err(AuthError::ConfigMissing);
        };

        let state = pkce::generate_state();
        let code_verifier = pkce::generate_verifier();
        let code_challenge = match pkce::derive_challenge(&code_verifier, self.digest) {
            Ok(c) => c,
            Err(e) => {
                self.set_status(&e.to_string());
                return Err(e);
            }
        };

        let refresh_token =
            self.session().map(|s| s.refresh_token).filter(|t| !t.is_empty());
        self.store.set_pending(&PendingAuthorization {
            state: state.clone(),
            code_verifier,
            refresh_token,
        });

        let url = pkce::build_authorize_url(
            &self.config.authorize_url,
            &AuthorizeRequest {
                client_id,
                redirect_uri,
                scopes: &self.config.scopes,
                state: &state,
                code_challenge: &code_challenge,
            },
        );
        info!("login initiated");
        self.location.assign(url.clone());
        Ok(url)
    }

    /// Complete a login from the current location's callback parameters.
    ///
    /// On state mismatch nothing changes, including the pending record. On
    /// exchange failure the pending record is cleared unless the exchange was
    /// cancelled.
    pub async fn handle_callback(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<CallbackOutcome, AuthError> {
        let url = self.location.current();
        let code = query_param(&url, "code");
        let error = query_param(&url, "error");
        if code.is_none() && error.is_none() {
            return Ok(CallbackOutcome::NotACallback);
        }

        let (Some(client_id), Some(redirect_uri)) =
            (self.config.client_id(), self.config.redirect_uri())
        else {
            return Err(AuthError::ConfigMissing);
        };

        if let Some(reason) = error {
            warn!(reason, "provider returned a login error");
            self.set_status(&format!("Spotify login error: {reason}"));
            self.location.replace(strip_query_params(&url, &["error"]));
            return Ok(CallbackOutcome::ProviderError(reason));
        }
        let code = code.unwrap_or_default();
        let returned_state = query_param(&url, "state");

        let pending = self
            .store
            .get_pending()
            .filter(|p| returned_state.as_deref() == Some(p.state.as_str()));
        let Some(pending) = pending else {
            warn!("callback state does not match pending authorization");
            self.set_status(&AuthError::StateMismatch.to_string());
            return Err(AuthError::StateMismatch);
        };

        self.set_status(STATUS_CONNECTING);
        let grant = match self
            .tokens
            .exchange_code(client_id, redirect_uri, &code, &pending.code_verifier, cancel)
            .await
        {
            Ok(grant) => grant,
            Err(e) if e.is_cancelled() => {
                debug!("code exchange cancelled, pending authorization kept");
                return Err(e);
            }
            Err(e) => {
                warn!(err = %e, status = ?e.http_status(), "code exchange failed");
                self.store.clear_pending();
                self.set_status(&e.to_string());
                return Err(e);
            }
        };

        let Some(access_token) = grant.access_token.clone() else {
            let e = AuthError::TokenExchange {
                message: "token response did not include an access token".to_owned(),
                status: None,
            };
            self.store.clear_pending();
            self.set_status(&e.to_string());
            return Err(e);
        };

        let session = AuthSession {
            access_token,
            refresh_token: grant
                .refresh_token
                .clone()
                .or(pending.refresh_token)
                .unwrap_or_default(),
            expires_at: grant.expires_at(self.clock.now_ms()),
            scope: grant.scope.clone().unwrap_or_else(|| self.config.scopes.join(" ")),
        };

        let expires_at = session.expires_at;
        self.install(session, false);
        self.sync_store();
        self.store.clear_pending();
        self.location.replace(strip_query_params(&url, &["code", "state"]));

        self.set_status(STATUS_CONNECTED);
        info!(expires_at, "connected");
        self.emit(AuthEvent::Connected { expires_at });
        Ok(CallbackOutcome::Connected)
    }

    // -- Refresh ----------------------------------------------------------------

    /// Arm the one refresh timer for `session`, cancelling any prior timer.
    ///
    /// Must be called within a Tokio runtime. Nothing is armed without a
    /// configured client id or a refresh token.
    pub fn schedule_refresh(self: &Arc<Self>, session: &AuthSession) {
        let armed = {
            let mut inner = self.inner.lock();
            self.arm_locked(&mut inner, Some(session))
        };
        if let Some(cancel) = armed {
            self.spawn_refresh(cancel, session.expires_at);
        }
    }

    fn spawn_refresh(self: &Arc<Self>, cancel: CancellationToken, expires_at: u64) {
        let delay = refresh_delay(self.clock.now_ms(), expires_at);
        debug!(delay_ms = delay.as_millis() as u64, "refresh armed");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            this.run_refresh(&cancel).await;
        });
    }

    async fn run_refresh(self: &Arc<Self>, cancel: &CancellationToken) {
        let (Some(client_id), Some(current)) = (self.config.client_id(), self.session()) else {
            return;
        };

        match self.tokens.refresh(client_id, &current.refresh_token, cancel).await {
            Ok(grant) => {
                let (next, armed) = {
                    let mut inner = self.inner.lock();
                    if cancel.is_cancelled() {
                        return;
                    }
                    let Some(prev) = inner.session.as_ref() else {
                        return;
                    };
                    let next = AuthSession {
                        access_token: grant
                            .access_token
                            .clone()
                            .unwrap_or_else(|| prev.access_token.clone()),
                        refresh_token: grant
                            .refresh_token
                            .clone()
                            .unwrap_or_else(|| prev.refresh_token.clone()),
                        expires_at: grant.expires_at(self.clock.now_ms()),
                        scope: grant.scope.clone().unwrap_or_else(|| prev.scope.clone()),
                    };
                    let armed = self.replace_locked(&mut inner, Some(next.clone()));
                    (next, armed)
                };
                self.sync_store();

                let current = {
                    let inner = self.inner.lock();
                    inner.session.as_ref() == Some(&next)
                        && !armed.as_ref().is_some_and(CancellationToken::is_cancelled)
                };
                if !current {
                    debug!("refreshed session superseded while persisting");
                    return;
                }
                info!(expires_at = next.expires_at, "access token refreshed");
                self.emit(AuthEvent::Refreshed { expires_at: next.expires_at });
                if let Some(cancel) = armed {
                    self.spawn_refresh(cancel, next.expires_at);
                }
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                warn!(err = %e, status = ?e.http_status(), "token refresh failed, keeping session");
                self.emit(AuthEvent::RefreshFailed { error: e.to_string() });
            }
        }
    }

    // -- Disconnect -------------------------------------------------------------

    /// Forget the session and any pending login. The catalog cache is kept.
    pub fn disconnect(&self) {
        self.drop_session();
        self.sync_store();
        self.store.clear_pending();
        self.set_status(STATUS_DISCONNECTED);
        info!("disconnected");
        self.emit(AuthEvent::Disconnected);
    }

    /// Cancel all timers. The manager is unusable for refresh afterwards.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // -- Internals --------------------------------------------------------------

    /// `from_store` marks the session as already matching the store.
    fn install(self: &Arc<Self>, session: AuthSession, from_store: bool) {
        let expires_at = session.expires_at;
        let armed = {
            let mut inner = self.inner.lock();
            let armed = self.replace_locked(&mut inner, Some(session));
            if from_store {
                inner.persisted = inner.revision;
            }
            armed
        };
        if let Some(cancel) = armed {
            self.spawn_refresh(cancel, expires_at);
        }
    }

    fn drop_session(&self) {
        let mut inner = self.inner.lock();
        self.replace_locked(&mut inner, None);
    }

    /// Swap the in-memory session, publish its token, and register the
    /// refresh for it in one hold of `inner`. Returns the refresh to spawn.
    fn replace_locked(
        &self,
        inner: &mut Inner,
        session: Option<AuthSession>,
    ) -> Option<CancellationToken> {
        inner.revision += 1;
        let armed = self.arm_locked(inner, session.as_ref());
        let token = session.as_ref().map(|s| s.access_token.clone());
        self.token_tx.send_if_modified(|cur| {
            if *cur == token {
                return false;
            }
            *cur = token;
            true
        });
        inner.session = session;
        armed
    }

    /// Cancel the armed refresh, if any, and register one for `session`.
    fn arm_locked(
        &self,
        inner: &mut Inner,
        session: Option<&AuthSession>,
    ) -> Option<CancellationToken> {
        if let Some(prev) = inner.refresh_cancel.take() {
            prev.cancel();
        }
        let session = session?;
        if self.config.client_id().is_none() || session.refresh_token.is_empty() {
            debug!("refresh not armed (no client id or refresh token)");
            return None;
        }
        let token = self.shutdown.child_token();
        inner.refresh_cancel = Some(token.clone());
        Some(token)
    }

    /// Write the in-memory session to the store. Repeats when memory changed
    /// while the write was in progress, so the last write always matches it.
    fn sync_store(&self) {
        loop {
            let (session, revision) = {
                let inner = self.inner.lock();
                (inner.session.clone(), inner.revision)
            };
            match &session {
                Some(session) => self.store.set_auth(session),
                None => self.store.clear_auth(),
            }
            let mut inner = self.inner.lock();
            if inner.revision == revision {
                inner.persisted = revision;
                return;
            }
        }
    }

    fn set_status(&self, message: &str) {
        self.inner.lock().status = Some(message.to_owned());
        self.emit(AuthEvent::Status(message.to_owned()));
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Epoch millis at which a session expiring at `expires_at` is refreshed:
/// one minute early, never in the past.
pub fn refresh_at(now_ms: u64, expires_at: u64) -> u64 {
    now_ms.max(expires_at.saturating_sub(REFRESH_MARGIN_MS))
}

pub fn refresh_delay(now_ms: u64, expires_at: u64) -> Duration {
    Duration::from_millis(refresh_at(now_ms, expires_at) - now_ms)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
