//! Session lifecycle: sign-in flows, authenticated calls, refresh and logout.
//!
//! # Data Flow
//! ```text
//! send(request)
//!     → read access token (at send time, never captured earlier)
//!     → call backend
//!     → 401? → join or start the single in-flight refresh
//!            → retry once with the new token
//!            → 401 again → session ends
//! ```
//!
//! # Design Decisions
//! - Every store mutation, the state broadcast and persistence happen
//!   under one short commit lock, so subscribers and storage never observe
//!   a state that disagrees with the tokens
//! - The refresh runs on its own task; callers only await a shared handle
//!   to it, so a caller going away does not cancel the refresh
//! - A refresh result is written back only if no login or logout happened
//!   while it was in flight
//! - Network failures never end a session; only a backend rejection does

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::config::SessionConfig;
use crate::observability::metrics;

use super::cache::QueryCache;
use super::client::{ApiClient, ApiRequest, ApiResponse};
use super::cookies::{CookieJar, CookieSpec};
use super::error::SessionError;
use super::storage::DurableStorage;
use super::store::{SessionSnapshot, SessionStore};
use super::types::{extract_session, extract_user, RegisterOutcome, SessionState, TokenPair, UserSnapshot};

type RefreshFuture = Shared<BoxFuture<'static, Result<String, SessionError>>>;

/// Owns the session for one client. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    client: ApiClient,
    settings: SessionConfig,
    store: SessionStore,
    cookies: CookieJar,
    storage: Arc<dyn DurableStorage>,
    cache: QueryCache,
    state: watch::Sender<SessionState>,
    commit: Mutex<()>,
    refresh: Mutex<Option<RefreshFuture>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn session_from(data: &Value) -> Result<TokenPair, SessionError> {
    extract_session(data).ok_or_else(|| SessionError::Decode("response carries no session".into()))
}

impl SessionManager {
    pub fn new(client: ApiClient, settings: SessionConfig, storage: Arc<dyn DurableStorage>) -> Self {
        let cookies = CookieJar::load(storage.clone());
        let (state, _) = watch::channel(SessionState::Unresolved);
        Self {
            inner: Arc::new(Inner {
                client,
                settings,
                store: SessionStore::new(),
                cookies,
                storage,
                cache: QueryCache::new(),
                state,
                commit: Mutex::new(()),
                refresh: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Cached identity. Never touches the network.
    pub fn get_current_user(&self) -> Option<UserSnapshot> {
        self.inner.store.user()
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.inner.store.snapshot()
    }

    /// The `Cookie` header the next call will carry.
    pub fn cookie_header(&self) -> Option<String> {
        self.inner.cookies.header()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// Pick up credentials left by a previous run.
    pub async fn restore(&self) -> SessionState {
        let settings = &self.inner.settings;
        let access = self.inner.cookies.get(&settings.access_cookie_name);
        let refresh = self.inner.storage.get(&settings.refresh_token_key);

        if access.is_none() && refresh.is_none() {
            let _guard = lock(&self.inner.commit);
            self.transition(SessionState::Unauthenticated);
            return self.state();
        }

        let epoch = {
            let _guard = lock(&self.inner.commit);
            self.inner.store.begin(access, refresh)
        };

        match self.refresh_identity().await {
            Ok(user) => {
                tracing::info!(user = %user.id, "Restored session");
                self.set_state_if(epoch, SessionState::Authenticated);
            }
            Err(SessionError::Unauthorized) => {
                self.drop_session_where(|s| s.epoch == epoch);
            }
            Err(SessionError::Invalidated) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Could not verify restored session; keeping it");
                self.set_state_if(epoch, SessionState::Authenticated);
            }
        }
        self.state()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.set_state(SessionState::Authenticating);
        let request = ApiRequest::post("/auth/login").json(json!({
            "email": email,
            "password": password,
        }));
        let result = self
            .call(&request, None)
            .await
            .and_then(ApiResponse::into_data)
            .and_then(|data| Ok((session_from(&data)?, extract_user(&data))));

        match result {
            Ok((tokens, user)) => {
                self.establish(tokens, user);
                tracing::info!("Signed in");
                Ok(())
            }
            Err(e) => {
                self.abort_authenticating();
                Err(e)
            }
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        referral_code: Option<&str>,
    ) -> Result<RegisterOutcome, SessionError> {
        self.set_state(SessionState::Authenticating);
        let mut body = json!({"email": email, "password": password});
        if let Some(code) = referral_code {
            body["referralCode"] = Value::String(code.to_string());
        }
        let result = self
            .call(&ApiRequest::post("/auth/register").json(body), None)
            .await
            .and_then(ApiResponse::into_data);

        match result {
            Ok(data) => match extract_session(&data) {
                Some(tokens) => {
                    self.establish(tokens, extract_user(&data));
                    Ok(RegisterOutcome::SignedIn)
                }
                None => {
                    self.abort_authenticating();
                    Ok(RegisterOutcome::VerificationRequired)
                }
            },
            Err(e) => {
                self.abort_authenticating();
                Err(e)
            }
        }
    }

    /// Confirm an email address. Returns true when the backend also signed the user in.
    pub async fn verify_email(&self, token: &str) -> Result<bool, SessionError> {
        let data = self
            .call(&ApiRequest::post("/auth/verify-email").json(json!({"token": token})), None)
            .await?
            .into_data()?;
        match extract_session(&data) {
            Some(tokens) => {
                self.establish(tokens, extract_user(&data));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Install tokens delivered by an OAuth or magic-link callback.
    pub async fn exchange_callback_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<UserSnapshot, SessionError> {
        self.set_state(SessionState::Authenticating);
        let request = ApiRequest::post("/auth/set-session").json(json!({
            "access_token": access_token,
            "refresh_token": refresh_token,
        }));
        let result = self
            .call(&request, Some(access_token))
            .await
            .and_then(ApiResponse::into_data);

        match result {
            Ok(data) => {
                let tokens = extract_session(&data).unwrap_or_else(|| TokenPair {
                    access_token: access_token.to_string(),
                    refresh_token: refresh_token.to_string(),
                });
                self.establish(tokens, extract_user(&data));
                self.refresh_identity().await
            }
            Err(e) => {
                self.abort_authenticating();
                Err(e)
            }
        }
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), SessionError> {
        self.call(&ApiRequest::post("/auth/forgot-password").json(json!({"email": email})), None)
            .await?
            .into_data()
            .map(|_| ())
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), SessionError> {
        let request = ApiRequest::post("/auth/reset-password").json(json!({
            "token": token,
            "password": password,
        }));
        self.call(&request, None).await?.into_data().map(|_| ())
    }

    /// End the session locally, then ask the backend to drop its half.
    ///
    /// Local state is cleared first, so a refresh still in flight cannot
    /// bring the session back.
    pub async fn logout(&self) {
        let previous = self.inner.store.snapshot();
        self.drop_session_where(|_| true);

        if previous.has_credentials() {
            let request = ApiRequest::post("/auth/logout").json(json!({
                "refresh_token": previous.refresh_token,
            }));
            if let Err(e) = self
                .call(&request, previous.access_token.as_deref())
                .await
                .and_then(ApiResponse::into_data)
            {
                tracing::warn!(error = %e, "Backend logout failed; local session already cleared");
            }
        }
        tracing::info!("Signed out");
    }

    /// Exchange the refresh token for a new pair now.
    pub async fn refresh_session(&self) -> Result<(), SessionError> {
        let stale = self.inner.store.access_token();
        self.coalesced_refresh(stale).await.map(|_| ())
    }

    /// Re-fetch the identity and cache it.
    pub async fn refresh_identity(&self) -> Result<UserSnapshot, SessionError> {
        let epoch = self.inner.store.epoch();
        let data = self.send(&ApiRequest::get("/auth/me")).await?;
        let user = extract_user(&data)
            .ok_or_else(|| SessionError::Decode("identity response carries no user".into()))?;

        let _guard = lock(&self.inner.commit);
        if self.inner.store.set_user_if(epoch, user.clone()) {
            Ok(user)
        } else {
            Err(SessionError::Invalidated)
        }
    }

    /// Replace the access token directly. `None` drops it but keeps the
    /// refresh token, so the next 401 can still recover.
    ///
    /// A refresh already in flight is discarded when it lands.
    pub fn set_access_token(&self, token: Option<String>) {
        let _guard = lock(&self.inner.commit);
        self.inner.store.set_access_token(token);
        self.persist();
        if self.inner.store.snapshot().has_credentials() {
            self.transition(SessionState::Authenticated);
        } else {
            self.transition(SessionState::Unauthenticated);
        }
    }

    /// Store the locale preference. Returns the `Set-Cookie` line.
    pub fn set_locale(&self, locale: &str) -> Result<String, SessionError> {
        let settings = &self.inner.settings;
        let spec = CookieSpec::locale(&settings.locale_cookie_name, settings.locale_cookie_max_age_secs);
        Ok(self.inner.cookies.set(&spec, locale)?)
    }

    /// Authenticated call with one refresh-and-retry on 401.
    pub async fn send(&self, request: &ApiRequest) -> Result<Value, SessionError> {
        let token = self.inner.store.access_token();
        let response = self.call(request, token.as_deref()).await?;
        if response.status != 401 {
            return response.into_data();
        }

        tracing::debug!(path = %request.path, "Unauthorized; refreshing session");
        let fresh = self.coalesced_refresh(token).await?;

        let retry = self.call(request, Some(&fresh)).await?;
        if retry.status == 401 {
            tracing::warn!(path = %request.path, "Still unauthorized after refresh; ending session");
            self.drop_session_where(|s| s.access_token.as_deref() == Some(fresh.as_str()));
            return Err(SessionError::Unauthorized);
        }
        retry.into_data()
    }

    /// `send`, answered from the per-session cache when possible.
    pub async fn fetch_cached(&self, request: &ApiRequest) -> Result<Value, SessionError> {
        let session = self.inner.store.snapshot().session_id;
        let key = request.cache_key();
        if let Some(hit) = session.and_then(|id| self.inner.cache.get(id, &key)) {
            return Ok(hit);
        }

        let value = self.send(request).await?;
        if let Some(id) = session {
            if self.inner.store.snapshot().session_id == Some(id) {
                self.inner.cache.insert(id, &key, value.clone());
            }
        }
        Ok(value)
    }

    async fn call(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse, SessionError> {
        let cookie = self.inner.cookies.header();
        let response = self.inner.client.execute(request, bearer, cookie.as_deref()).await?;
        if let Err(e) = self.inner.cookies.absorb(&response.set_cookies) {
            tracing::warn!(error = %e, "Failed to store response cookies");
        }
        Ok(response)
    }

    /// Join the in-flight refresh, or start one.
    ///
    /// `stale` is the token the failed call carried. If the store already
    /// holds a different one, someone refreshed in the meantime and that
    /// token is returned without another round trip.
    async fn coalesced_refresh(&self, stale: Option<String>) -> Result<String, SessionError> {
        let pending = {
            let mut slot = lock(&self.inner.refresh);
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let snapshot = self.inner.store.snapshot();
                    if let Some(current) = &snapshot.access_token {
                        if stale.as_deref() != Some(current.as_str()) {
                            return Ok(current.clone());
                        }
                    }
                    let Some(refresh_token) = snapshot.refresh_token.clone() else {
                        drop(slot);
                        self.drop_session_where(|s| s.epoch == snapshot.epoch);
                        return Err(SessionError::Unauthorized);
                    };
                    let pending = self.spawn_refresh(snapshot.epoch, refresh_token);
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        match pending.await {
            // A newer token was written while the refresh was in flight.
            Err(SessionError::Invalidated) => match self.inner.store.access_token() {
                Some(current) if stale.as_deref() != Some(current.as_str()) => Ok(current),
                _ => Err(SessionError::Invalidated),
            },
            outcome => outcome,
        }
    }

    fn spawn_refresh(&self, epoch: u64, refresh_token: String) -> RefreshFuture {
        self.set_state_if(epoch, SessionState::Refreshing);
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let outcome = manager.run_refresh(epoch, refresh_token).await;
            *lock(&manager.inner.refresh) = None;
            outcome
        });
        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(SessionError::Network(format!("refresh task failed: {}", e))))
        }
        .boxed()
        .shared()
    }

    async fn run_refresh(&self, epoch: u64, refresh_token: String) -> Result<String, SessionError> {
        let request = ApiRequest::post("/auth/refresh").json(json!({"refresh_token": refresh_token}));
        let result = self
            .call(&request, None)
            .await
            .and_then(ApiResponse::into_data)
            .and_then(|data| session_from(&data));

        let _guard = lock(&self.inner.commit);
        match result {
            Ok(tokens) => {
                if self.inner.store.replace_tokens_if(epoch, &tokens) {
                    self.persist();
                    self.transition(SessionState::Authenticated);
                    metrics::record_refresh("success");
                    tracing::debug!("Access token refreshed");
                    Ok(tokens.access_token)
                } else {
                    metrics::record_refresh("discarded");
                    tracing::debug!("Discarding refresh result for a replaced session");
                    Err(SessionError::Invalidated)
                }
            }
            Err(e) if e.is_network() => {
                metrics::record_refresh("network");
                tracing::warn!(error = %e, "Refresh failed on the network; keeping session");
                if self.inner.store.epoch() == epoch {
                    self.transition(SessionState::Authenticated);
                }
                Err(e)
            }
            Err(e) => {
                metrics::record_refresh("rejected");
                tracing::info!(error = %e, "Refresh rejected; ending session");
                self.clear_locked(epoch);
                Err(SessionError::Unauthorized)
            }
        }
    }

    fn establish(&self, tokens: TokenPair, user: Option<UserSnapshot>) {
        let _guard = lock(&self.inner.commit);
        let previous = self.inner.store.snapshot();
        let epoch = self
            .inner
            .store
            .begin(Some(tokens.access_token), Some(tokens.refresh_token));
        if let Some(user) = user {
            self.inner.store.set_user_if(epoch, user);
        }
        if let Some(id) = previous.session_id {
            self.inner.cache.clear_session(id);
        }
        self.persist();
        self.transition(SessionState::Authenticated);
    }

    /// A sign-in attempt failed; fall back to whatever session was there.
    fn abort_authenticating(&self) {
        let _guard = lock(&self.inner.commit);
        if self.state() != SessionState::Authenticating {
            return;
        }
        if self.inner.store.snapshot().has_credentials() {
            self.transition(SessionState::Authenticated);
        } else {
            self.transition(SessionState::Unauthenticated);
        }
    }

    fn drop_session_where<F>(&self, pred: F) -> bool
    where
        F: FnOnce(&SessionSnapshot) -> bool,
    {
        let _guard = lock(&self.inner.commit);
        let snapshot = self.inner.store.snapshot();
        pred(&snapshot) && self.clear_locked(snapshot.epoch)
    }

    /// Commit lock must be held.
    fn clear_locked(&self, epoch: u64) -> bool {
        let previous = self.inner.store.snapshot();
        if !self.inner.store.clear_if(epoch) {
            return false;
        }
        if let Some(id) = previous.session_id {
            self.inner.cache.clear_session(id);
        }
        self.persist();
        self.transition(SessionState::Unauthenticated);
        true
    }

    /// Mirror the store into the cookie jar and durable storage. Commit lock must be held.
    fn persist(&self) {
        let settings = &self.inner.settings;
        let snapshot = self.inner.store.snapshot();
        let spec = CookieSpec::access_token(&settings.access_cookie_name, settings.access_cookie_max_age_secs);

        let cookie = match &snapshot.access_token {
            Some(token) => self.inner.cookies.set(&spec, token),
            None => self.inner.cookies.remove(&spec),
        };
        let refresh = match &snapshot.refresh_token {
            Some(token) => self.inner.storage.set(&settings.refresh_token_key, token),
            None => self.inner.storage.remove(&settings.refresh_token_key),
        };
        if let Err(e) = cookie.map(|_| ()).and(refresh) {
            tracing::warn!(error = %e, "Failed to persist session");
        }
    }

    fn set_state(&self, to: SessionState) {
        let _guard = lock(&self.inner.commit);
        self.transition(to);
    }

    fn set_state_if(&self, epoch: u64, to: SessionState) {
        let _guard = lock(&self.inner.commit);
        if self.inner.store.epoch() == epoch {
            self.transition(to);
        }
    }

    /// Commit lock must be held.
    fn transition(&self, to: SessionState) {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == to {
                false
            } else {
                *current = to;
                true
            }
        });
        if changed {
            metrics::record_transition(to.as_str());
            tracing::debug!(state = to.as_str(), "Session state changed");
        }
    }
}
