//! latchkey-core - client-side session and credential lifecycle.
//!
//! The pieces, leaf to root:
//! - [`TokenStore`]: owns the access/refresh token pair, durable across runs
//! - [`Gateway`]: authenticated JSON requests with one 401 refresh-retry pass
//! - [`RefreshCoordinator`]: single-flighted token refresh, forced logout on
//!   unrecoverable failure
//! - [`PasskeyClient`]: WebAuthn registration/authentication ceremonies
//! - [`SessionManager`]: the authenticated-user projection front-ends render
//!
//! Wiring is explicit - construct the store once and hand clones to each
//! component:
//!
//! ```no_run
//! use std::sync::Arc;
//! use latchkey_core::{Gateway, Navigator, RefreshCoordinator, SessionManager, TokenStore};
//!
//! struct Shell;
//! impl Navigator for Shell {
//!     fn redirect_to(&self, target: &str) {
//!         println!("-> {target}");
//!     }
//! }
//!
//! # fn main() -> Result<(), latchkey_core::ApiError> {
//! let store = TokenStore::in_memory();
//! let refresher = RefreshCoordinator::new("http://localhost:8080", store.clone(), Arc::new(Shell))?;
//! let gateway = Gateway::new("http://localhost:8080", store.clone(), refresher)?;
//! let session = SessionManager::new(gateway, store);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod passkey;

pub use api::{AccountClient, ApiError, Gateway};
pub use auth::{
    Navigator, RefreshCoordinator, SessionManager, SessionState, StoreError, TokenPair,
    TokenStore, LOGIN_ROUTE,
};
pub use config::Config;
pub use models::{
    AccountStatus, LoginResponse, PasskeyDescriptor, PasskeyKind, RecoveryCodes, RecoveryStatus,
    UserProfile,
};
pub use passkey::{
    biometric_capabilities, Authenticator, AuthenticatorAttachment, AuthenticatorError,
    BiometricCapabilities, BiometricType, CeremonyError, CeremonyState, NoAuthenticator,
    PasskeyClient,
};
