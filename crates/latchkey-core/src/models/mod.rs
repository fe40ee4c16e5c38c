//! Domain types shared across the client.
//!
//! Wire formats follow the server's camelCase JSON; field renames are
//! explicit so the Rust side stays snake_case.

pub mod passkey;
pub mod user;

pub use passkey::{PasskeyDescriptor, PasskeyKind};
pub use user::{AccountStatus, LoginResponse, RecoveryCodes, RecoveryStatus, UserProfile};
