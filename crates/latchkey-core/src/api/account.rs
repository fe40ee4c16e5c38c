//! Account management: registration, passwords, recovery codes.
//!
//! Plain authenticated CRUD; all the session machinery lives in the
//! gateway underneath.

use super::{ApiError, Gateway};
use crate::models::{AccountStatus, LoginResponse, RecoveryCodes, RecoveryStatus};

pub struct AccountClient {
    gateway: Gateway,
}

impl AccountClient {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Create a password account.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        self.gateway
            .post_ack(
                "/auth/register",
                &serde_json::json!({
                    "email": email,
                    "username": username,
                    "password": password,
                }),
            )
            .await
    }

    /// Which sign-in methods the account currently has.
    pub async fn account_status(&self) -> Result<AccountStatus, ApiError> {
        self.gateway.get("/auth/account-status").await
    }

    /// First password for an account created through OAuth or a passkey.
    pub async fn set_password(&self, password: &str, confirm: &str) -> Result<(), ApiError> {
        self.gateway
            .post_ack(
                "/auth/set-password",
                &serde_json::json!({
                    "password": password,
                    "confirmPassword": confirm,
                }),
            )
            .await
    }

    pub async fn change_password(
        &self,
        current: &str,
        new: &str,
        confirm: &str,
    ) -> Result<(), ApiError> {
        self.gateway
            .post_ack(
                "/auth/change-password",
                &serde_json::json!({
                    "currentPassword": current,
                    "newPassword": new,
                    "confirmPassword": confirm,
                }),
            )
            .await
    }

    /// Generate a fresh batch of recovery codes, invalidating earlier ones.
    /// The codes are shown once and cannot be fetched again.
    pub async fn generate_recovery_codes(&self) -> Result<RecoveryCodes, ApiError> {
        self.gateway.post("/recovery/generate", &serde_json::json!({})).await
    }

    pub async fn recovery_status(&self) -> Result<RecoveryStatus, ApiError> {
        self.gateway.get("/recovery/status").await
    }

    /// Sign in with a recovery code. Burns the code on success.
    pub async fn verify_recovery_code(
        &self,
        identifier: &str,
        code: &str,
    ) -> Result<LoginResponse, ApiError> {
        self.gateway
            .post(
                "/recovery/verify",
                &serde_json::json!({ "identifier": identifier, "code": code }),
            )
            .await
    }
}
