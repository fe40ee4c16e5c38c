use std::sync::Arc;

use thiserror::Error;

use crate::auth::store::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No stored refresh token; there is no session to refresh.
    /// Callers treat this as "logged out", not as a retryable failure.
    #[error("Not logged in - no refresh token stored")]
    NoRefreshToken,

    /// The server would not exchange the refresh token.
    #[error("Session refresh rejected: {0}")]
    RefreshRejected(String),

    /// Terminal outcome of a refresh attempt. The cause is shared by every
    /// request that piggybacked on the same single-flighted refresh.
    #[error("Session refresh failed: {0}")]
    RefreshFailed(#[source] Arc<ApiError>),

    #[error("Credential storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True when the failure means "there is no usable session anymore".
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized
                | ApiError::NoRefreshToken
                | ApiError::RefreshRejected(_)
                | ApiError::RefreshFailed(_)
        )
    }
}
