//! Authenticated request gateway.
//!
//! Every outbound request carries the stored access token as a bearer
//! header. A 401 response triggers exactly one refresh-and-retry pass for
//! the originating request; the refresh itself runs on the coordinator's
//! raw transport and never loops back through here. Every other error
//! class maps to a typed `ApiError` and passes through untouched.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{normalize_base_url, ApiError, REQUEST_TIMEOUT_SECS};
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::store::TokenStore;

struct GatewayInner {
    http: Client,
    base_url: String,
    store: TokenStore,
    refresher: RefreshCoordinator,
}

/// JSON request gateway.
/// Clone is cheap - reqwest::Client uses Arc internally for connection
/// pooling, and the rest of the state is behind one Arc.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn new(
        base_url: &str,
        store: TokenStore,
        refresher: RefreshCoordinator,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            inner: Arc::new(GatewayInner {
                http,
                base_url: normalize_base_url(base_url),
                store,
                refresher,
            }),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute::<()>(Method::GET, path, None).await?;
        Self::decode(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.execute(Method::POST, path, Some(body)).await?;
        Self::decode(response).await
    }

    /// POST where only success matters; the response body is discarded.
    pub async fn post_ack<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        self.execute(Method::POST, path, Some(body)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute::<()>(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Send the request, refreshing the session and re-issuing it at most
    /// once if the access token is rejected.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let used = self.inner.store.access_token();
        let response = self.send(method.clone(), path, body, used.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response).await;
        }

        debug!(path, "Access token rejected, refreshing session");
        let access = match self.inner.refresher.refresh_after(used).await {
            Ok(access) => access,
            // Nothing to refresh with: surface the original rejection.
            Err(ApiError::NoRefreshToken) => return Err(ApiError::Unauthorized),
            Err(err) => return Err(err),
        };
        let retry = self.send(method, path, body, Some(access.as_str())).await?;
        Self::check(retry).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.inner.base_url, path);
        let mut request = self.inner.http.request(method, &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        response
            .json()
            .await
            .map_err(|err| ApiError::InvalidResponse(err.to_string()))
    }
}
