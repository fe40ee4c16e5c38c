//! Capability probing with safe defaults.
//!
//! Probing never fails: an authenticator that errors while being queried
//! is reported as "unsupported", and the caller renders a degraded but
//! working sign-in page instead of an error.

use serde::Serialize;
use tracing::debug;

use super::authenticator::Authenticator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum BiometricType {
    Face,
    Fingerprint,
    None,
}

/// What the current host can do, WebAuthn-wise.
/// Computed once per process; never persisted.
#[derive(Debug, Clone, Copy, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct BiometricCapabilities {
    #[serde(rename = "webAuthnSupported")]
    pub webauthn_supported: bool,
    #[serde(rename = "platformAuthenticator")]
    pub platform_authenticator: bool,
    #[serde(rename = "conditionalUI")]
    pub conditional_ui: bool,
    #[serde(rename = "biometricType")]
    pub biometric_type: BiometricType,
}

impl BiometricCapabilities {
    pub fn unsupported() -> Self {
        Self {
            webauthn_supported: false,
            platform_authenticator: false,
            conditional_ui: false,
            biometric_type: BiometricType::None,
        }
    }
}

/// Probe the authenticator. Probe errors degrade to `false`.
pub async fn biometric_capabilities<A: Authenticator>(authenticator: &A) -> BiometricCapabilities {
    let mut capabilities = BiometricCapabilities::unsupported();
    capabilities.webauthn_supported = authenticator.webauthn_supported();
    if !capabilities.webauthn_supported {
        return capabilities;
    }

    capabilities.platform_authenticator = authenticator
        .platform_authenticator_available()
        .await
        .unwrap_or(false);
    capabilities.conditional_ui = authenticator
        .conditional_mediation_available()
        .await
        .unwrap_or(false);

    if capabilities.platform_authenticator {
        capabilities.biometric_type = biometric_type_for_os(std::env::consts::OS);
    }

    debug!(?capabilities, "Probed authenticator capabilities");
    capabilities
}

/// Guess which biometric a platform authenticator fronts on this OS.
/// Only consulted once a platform authenticator is known to exist, so the
/// fallback is a generic fingerprint rather than none.
fn biometric_type_for_os(os: &str) -> BiometricType {
    match os {
        "ios" => BiometricType::Face,
        "macos" | "android" | "windows" => BiometricType::Fingerprint,
        _ => BiometricType::Fingerprint,
    }
}
