use futures::future::{ready, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthenticatorError {
    /// The user dismissed the ceremony. Never retried automatically.
    #[error("ceremony cancelled")]
    Cancelled,

    /// No authenticator hardware/runtime on this host.
    #[error("no authenticator available")]
    Unavailable,

    #[error("{0}")]
    Failed(String),
}

/// The browser/platform side of a WebAuthn ceremony.
///
/// A web shell backs this with `navigator.credentials`; tests use scripted
/// implementations. Options and responses are opaque JSON passed straight
/// between server and authenticator.
pub trait Authenticator: Send + Sync {
    /// Cheap static probe; `false` short-circuits every ceremony.
    fn webauthn_supported(&self) -> bool;

    /// Is a device-bound (biometric) authenticator present?
    fn platform_authenticator_available(&self) -> BoxFuture<'_, Result<bool, AuthenticatorError>>;

    /// Can credentials be offered through conditional UI (autofill)?
    fn conditional_mediation_available(&self) -> BoxFuture<'_, Result<bool, AuthenticatorError>>;

    /// Run the credential-creation ceremony for the given options and
    /// return the attestation response.
    fn create_credential(&self, options: Value) -> BoxFuture<'_, Result<Value, AuthenticatorError>>;

    /// Run the credential-assertion ceremony for the given options and
    /// return the assertion response.
    fn get_assertion(&self, options: Value) -> BoxFuture<'_, Result<Value, AuthenticatorError>>;
}

/// Safe default for hosts without WebAuthn: reports nothing available and
/// fails ceremonies immediately.
pub struct NoAuthenticator;

impl Authenticator for NoAuthenticator {
    fn webauthn_supported(&self) -> bool {
        false
    }

    fn platform_authenticator_available(&self) -> BoxFuture<'_, Result<bool, AuthenticatorError>> {
        ready(Ok(false)).boxed()
    }

    fn conditional_mediation_available(&self) -> BoxFuture<'_, Result<bool, AuthenticatorError>> {
        ready(Ok(false)).boxed()
    }

    fn create_credential(&self, _options: Value) -> BoxFuture<'_, Result<Value, AuthenticatorError>> {
        ready(Err(AuthenticatorError::Unavailable)).boxed()
    }

    fn get_assertion(&self, _options: Value) -> BoxFuture<'_, Result<Value, AuthenticatorError>> {
        ready(Err(AuthenticatorError::Unavailable)).boxed()
    }
}
