//! Registration and authentication ceremonies.
//!
//! Each ceremony walks a fixed state machine:
//! `Idle -> OptionsRequested -> ChallengeIssued -> CeremonyInProgress ->
//! Verifying -> Succeeded | Failed`. A failure at any step resolves the
//! ceremony to `Failed` with the cause attached; nothing is persisted
//! along the way, so an aborted ceremony leaves the token store untouched.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::authenticator::{Authenticator, AuthenticatorError};
use super::capabilities::{biometric_capabilities, BiometricCapabilities};
use crate::api::{ApiError, Gateway};
use crate::models::{LoginResponse, PasskeyDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyState {
    Idle,
    OptionsRequested,
    ChallengeIssued,
    CeremonyInProgress,
    Verifying,
    Succeeded,
    Failed,
}

/// Authenticator scope requested at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticatorAttachment {
    /// Device-bound (Touch ID, Windows Hello)
    Platform,
    /// Removable (security key, phone hybrid)
    CrossPlatform,
}

impl AuthenticatorAttachment {
    fn as_str(self) -> &'static str {
        match self {
            AuthenticatorAttachment::Platform => "platform",
            AuthenticatorAttachment::CrossPlatform => "cross-platform",
        }
    }
}

#[derive(Error, Debug)]
pub enum CeremonyError {
    #[error("Passkey ceremony failed: WebAuthn is not supported here")]
    Unsupported,

    #[error("Passkey ceremony failed: cancelled")]
    Cancelled,

    #[error("Passkey ceremony failed: {0}")]
    Authenticator(#[source] AuthenticatorError),

    #[error("Passkey ceremony failed: {0}")]
    Api(#[from] ApiError),
}

impl From<AuthenticatorError> for CeremonyError {
    fn from(err: AuthenticatorError) -> Self {
        match err {
            AuthenticatorError::Cancelled => CeremonyError::Cancelled,
            AuthenticatorError::Unavailable => CeremonyError::Unsupported,
            failed => CeremonyError::Authenticator(failed),
        }
    }
}

/// One ceremony's walk through the state machine, logged at transitions.
struct Ceremony {
    kind: &'static str,
    state: CeremonyState,
}

impl Ceremony {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: CeremonyState::Idle,
        }
    }

    fn advance(&mut self, next: CeremonyState) {
        debug!(ceremony = self.kind, from = ?self.state, to = ?next, "Ceremony transition");
        self.state = next;
    }

    fn fail(&mut self, err: CeremonyError) -> CeremonyError {
        warn!(ceremony = self.kind, state = ?self.state, error = %err, "Ceremony failed");
        self.state = CeremonyState::Failed;
        err
    }
}

/// Orchestrates passkey ceremonies and CRUD against the server.
pub struct PasskeyClient<A> {
    gateway: Gateway,
    authenticator: A,
}

impl<A: Authenticator> PasskeyClient<A> {
    pub fn new(gateway: Gateway, authenticator: A) -> Self {
        Self {
            gateway,
            authenticator,
        }
    }

    /// Register a new passkey, optionally scoped to one authenticator
    /// class. Returns the server's confirmation payload.
    pub async fn register(
        &self,
        attachment: Option<AuthenticatorAttachment>,
    ) -> Result<Value, CeremonyError> {
        if !self.authenticator.webauthn_supported() {
            return Err(CeremonyError::Unsupported);
        }
        let mut ceremony = Ceremony::new("registration");

        ceremony.advance(CeremonyState::OptionsRequested);
        let body = match attachment {
            Some(attachment) => serde_json::json!({ "authenticatorType": attachment.as_str() }),
            None => serde_json::json!({}),
        };
        let options: Value = match self.gateway.post("/passkey/register/options", &body).await {
            Ok(options) => options,
            Err(err) => return Err(ceremony.fail(err.into())),
        };
        ceremony.advance(CeremonyState::ChallengeIssued);

        ceremony.advance(CeremonyState::CeremonyInProgress);
        let attestation = match self.authenticator.create_credential(options).await {
            Ok(attestation) => attestation,
            Err(err) => return Err(ceremony.fail(err.into())),
        };

        ceremony.advance(CeremonyState::Verifying);
        let receipt: Value = match self.gateway.post("/passkey/register", &attestation).await {
            Ok(receipt) => receipt,
            Err(err) => return Err(ceremony.fail(err.into())),
        };

        ceremony.advance(CeremonyState::Succeeded);
        Ok(receipt)
    }

    /// Sign in with a passkey. Returns the fresh token pair and user; the
    /// caller (normally `SessionManager::login`) owns applying them.
    pub async fn authenticate(
        &self,
        identifier: Option<&str>,
    ) -> Result<LoginResponse, CeremonyError> {
        if !self.authenticator.webauthn_supported() {
            return Err(CeremonyError::Unsupported);
        }
        let mut ceremony = Ceremony::new("authentication");

        ceremony.advance(CeremonyState::OptionsRequested);
        let body = match identifier {
            Some(identifier) => serde_json::json!({ "identifier": identifier }),
            None => serde_json::json!({}),
        };
        let options: Value = match self.gateway.post("/passkey/authenticate/options", &body).await {
            Ok(options) => options,
            Err(err) => return Err(ceremony.fail(err.into())),
        };
        ceremony.advance(CeremonyState::ChallengeIssued);

        ceremony.advance(CeremonyState::CeremonyInProgress);
        let assertion = match self.authenticator.get_assertion(options).await {
            Ok(assertion) => assertion,
            Err(err) => return Err(ceremony.fail(err.into())),
        };

        ceremony.advance(CeremonyState::Verifying);
        let login: LoginResponse = match self.gateway.post("/passkey/authenticate", &assertion).await
        {
            Ok(login) => login,
            Err(err) => return Err(ceremony.fail(err.into())),
        };

        ceremony.advance(CeremonyState::Succeeded);
        Ok(login)
    }

    /// List the account's registered passkeys.
    pub async fn list(&self) -> Result<Vec<PasskeyDescriptor>, ApiError> {
        self.gateway.get("/passkey/list").await
    }

    /// Delete a passkey by credential id. The server treats deleting an
    /// already-deleted id as the normal response, so there is no
    /// client-side special case.
    pub async fn delete(&self, credential_id: &str) -> Result<(), ApiError> {
        self.gateway.delete(&format!("/passkey/{}", credential_id)).await
    }

    pub async fn biometric_capabilities(&self) -> BiometricCapabilities {
        biometric_capabilities(&self.authenticator).await
    }
}
