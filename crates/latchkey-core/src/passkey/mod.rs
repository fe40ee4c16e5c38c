//! Passkey (WebAuthn) ceremonies and capability detection.
//!
//! Flow overview:
//! 1) Request registration or authentication options from the server.
//! 2) Hand the challenge to the authenticator for the browser-side
//!    credential ceremony.
//! 3) Submit the attestation/assertion back for verification.
//!
//! The authenticator itself sits behind the [`Authenticator`] trait; the
//! challenge and response payloads stay opaque JSON because their format
//! is owned by the server and the authenticator, not by this client. An
//! aborted ceremony leaves no partial state behind.

pub mod authenticator;
pub mod capabilities;
pub mod ceremony;

pub use authenticator::{Authenticator, AuthenticatorError, NoAuthenticator};
pub use capabilities::{biometric_capabilities, BiometricCapabilities, BiometricType};
pub use ceremony::{AuthenticatorAttachment, CeremonyError, CeremonyState, PasskeyClient};
