//! The authenticated-user projection consumed by front-ends.
//!
//! `SessionState` is derived, never authoritative: it is rebuilt from the
//! token store plus a `/auth/me` lookup on startup, and mutated only by
//! login, logout, and user refresh. A stale stored session self-heals into
//! "logged out" instead of surfacing an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Gateway};
use crate::auth::store::TokenStore;
use crate::models::{LoginResponse, UserProfile};

/// Snapshot of the session as the UI should render it.
/// `is_authenticated` follows the user projection, not token presence:
/// tokens without a confirmed identity are not a signed-in session yet.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionState {
    pub user: Option<UserProfile>,
    #[serde(rename = "isAuthenticated")]
    pub is_authenticated: bool,
    pub loading: bool,
}

struct SessionInner {
    gateway: Gateway,
    store: TokenStore,
    user: RwLock<Option<UserProfile>>,
    loading: AtomicBool,
}

/// Holds the in-memory session and drives login/logout transitions.
/// Clone is cheap and shares one inner state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(gateway: Gateway, store: TokenStore) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                gateway,
                store,
                user: RwLock::new(None),
                loading: AtomicBool::new(false),
            }),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    pub fn state(&self) -> SessionState {
        let user = self.read_user().clone();
        SessionState {
            is_authenticated: user.is_some(),
            user,
            loading: self.inner.loading.load(Ordering::SeqCst),
        }
    }

    /// Rebuild the session from storage: with tokens present, confirm the
    /// identity against the server. A failed lookup clears the credentials
    /// and reports "logged out" rather than erroring - stale tokens are a
    /// normal state to recover from, not an exceptional one.
    pub async fn initialize(&self) -> SessionState {
        self.fetch_user().await
    }

    /// Re-fetch the current identity into the session.
    pub async fn refresh_user(&self) -> SessionState {
        self.fetch_user().await
    }

    async fn fetch_user(&self) -> SessionState {
        self.inner.loading.store(true, Ordering::SeqCst);
        if self.inner.store.is_authenticated() {
            match self.inner.gateway.get::<UserProfile>("/auth/me").await {
                Ok(user) => {
                    debug!(username = %user.username, "Session restored");
                    *self.write_user() = Some(user);
                }
                Err(err) => {
                    warn!(error = %err, "Stored session is not usable, clearing it");
                    if let Err(err) = self.inner.store.clear_tokens() {
                        warn!(error = %err, "Failed to clear stored credentials");
                    }
                    *self.write_user() = None;
                }
            }
        }
        self.inner.loading.store(false, Ordering::SeqCst);
        self.state()
    }

    /// Pure state transition: persist the pair, set the user.
    pub fn login(&self, access: &str, refresh: &str, user: UserProfile) -> Result<(), ApiError> {
        self.inner.store.set_tokens(access, refresh)?;
        info!(username = %user.username, "Logged in");
        *self.write_user() = Some(user);
        Ok(())
    }

    /// Password sign-in against `/auth/login`.
    pub async fn login_with_password(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<UserProfile, ApiError> {
        let response: LoginResponse = self
            .inner
            .gateway
            .post(
                "/auth/login",
                &serde_json::json!({ "identifier": identifier, "password": password }),
            )
            .await?;
        self.login(&response.access_token, &response.refresh_token, response.user.clone())?;
        Ok(response.user)
    }

    /// Best-effort server notification, unconditional local cleanup.
    /// Local logout always succeeds even when the server is unreachable.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.inner.store.refresh_token() {
            let body = serde_json::json!({ "refreshToken": refresh_token });
            if let Err(err) = self.inner.gateway.post_ack("/auth/logout", &body).await {
                warn!(error = %err, "Logout notification failed, clearing local session anyway");
            }
        }
        if let Err(err) = self.inner.store.clear_tokens() {
            warn!(error = %err, "Failed to clear stored credentials");
        }
        *self.write_user() = None;
        info!("Logged out");
    }

    pub(crate) fn set_user(&self, user: UserProfile) {
        *self.write_user() = Some(user);
    }

    fn read_user(&self) -> std::sync::RwLockReadGuard<'_, Option<UserProfile>> {
        self.inner.user.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_user(&self) -> std::sync::RwLockWriteGuard<'_, Option<UserProfile>> {
        self.inner.user.write().unwrap_or_else(PoisonError::into_inner)
    }
}
