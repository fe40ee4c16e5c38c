//! Token refresh with single-flight coalescing.
//!
//! When the access token expires, every in-flight request fails with 401 at
//! roughly the same time. All of them funnel into one refresh call: the
//! first failing request starts the exchange and parks a shared handle to
//! it, the rest await that same handle, and everyone observes the same
//! rotated pair or the same failure.
//!
//! The exchange runs on its own raw HTTP client so it can never re-enter
//! the gateway's 401 interception. An unrecoverable refresh clears the
//! stored credentials and sends the user agent to the login route, once.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{normalize_base_url, ApiError, REQUEST_TIMEOUT_SECS};
use crate::auth::store::{TokenPair, TokenStore};
use crate::auth::{Navigator, LOGIN_ROUTE};

/// One in-flight refresh, shared between every request that hit 401 on the
/// same expired token. The error is behind an `Arc` so all waiters can own
/// the same cause.
type InFlightRefresh = Shared<BoxFuture<'static, Result<TokenPair, Arc<ApiError>>>>;

struct RefreshInner {
    http: Client,
    base_url: String,
    store: TokenStore,
    navigator: Arc<dyn Navigator>,
    in_flight: Mutex<Option<InFlightRefresh>>,
}

/// Exchanges the stored refresh token for a new token pair.
/// Clone is cheap and shares the in-flight slot.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<RefreshInner>,
}

impl RefreshCoordinator {
    pub fn new(
        base_url: &str,
        store: TokenStore,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            inner: Arc::new(RefreshInner {
                http,
                base_url: normalize_base_url(base_url),
                store,
                navigator,
                in_flight: Mutex::new(None),
            }),
        })
    }

    /// Refresh the session and return the new access token.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let stale = self.inner.store.access_token();
        self.refresh_after(stale).await
    }

    /// Refresh on behalf of a request that failed with `stale_access`.
    /// If another caller already rotated the pair, the fresh token is
    /// returned without touching the network.
    pub(crate) async fn refresh_after(
        &self,
        stale_access: Option<String>,
    ) -> Result<String, ApiError> {
        let shared = {
            let mut slot = self.inner.in_flight.lock().await;

            if let Some(current) = self.inner.store.access_token() {
                if stale_access.as_deref() != Some(current.as_str()) {
                    debug!("token already rotated by a concurrent refresh");
                    return Ok(current);
                }
            }
            if self.inner.store.refresh_token().is_none() {
                return Err(ApiError::NoRefreshToken);
            }

            if let Some(in_flight) = slot.clone() {
                in_flight
            } else {
                let in_flight: InFlightRefresh =
                    Self::run_refresh(Arc::clone(&self.inner)).boxed().shared();
                *slot = Some(in_flight.clone());
                in_flight
            }
        };

        let result = shared.await;

        // Retire the slot once the outcome has landed; the next expiry
        // starts a fresh flight. A still-pending successor is left alone.
        {
            let mut slot = self.inner.in_flight.lock().await;
            if slot.as_ref().is_some_and(|f| f.peek().is_some()) {
                *slot = None;
            }
        }

        match result {
            Ok(pair) => Ok(pair.access_token),
            Err(cause) => Err(ApiError::RefreshFailed(cause)),
        }
    }

    /// The single refresh flight. Runs at most once per coalesced burst;
    /// failure is terminal for the session.
    async fn run_refresh(inner: Arc<RefreshInner>) -> Result<TokenPair, Arc<ApiError>> {
        let Some(refresh_token) = inner.store.refresh_token() else {
            // The pair vanished between enqueue and execution (logout race).
            return Err(Arc::new(ApiError::NoRefreshToken));
        };

        debug!("exchanging refresh token for a new session");
        let failure = match Self::exchange(&inner, &refresh_token).await {
            Ok(pair) => match inner.store.set_tokens(&pair.access_token, &pair.refresh_token) {
                Ok(()) => {
                    info!("session refreshed");
                    return Ok(pair);
                }
                Err(err) => ApiError::Storage(err),
            },
            Err(err) => err,
        };

        warn!(error = %failure, "Session refresh failed, forcing logout");
        if let Err(err) = inner.store.clear_tokens() {
            warn!(error = %err, "Failed to clear stored credentials");
        }
        inner.navigator.redirect_to(LOGIN_ROUTE);
        Err(Arc::new(failure))
    }

    async fn exchange(inner: &RefreshInner, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let url = format!("{}/auth/refresh", inner.base_url);
        let response = inner
            .http
            .post(&url)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::RefreshRejected(format!(
                "{}: {}",
                status,
                ApiError::truncate_body(&body)
            )));
        }

        response
            .json()
            .await
            .map_err(|err| ApiError::InvalidResponse(err.to_string()))
    }
}
