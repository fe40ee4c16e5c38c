use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered passkey as reported by `GET /passkey/list`.
/// Read-only projection; the private key never leaves the authenticator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PasskeyDescriptor {
    #[serde(rename = "credentialId")]
    pub credential_id: String,
    pub label: Option<String>,
    #[serde(default)]
    pub transports: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastUsedAt")]
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Rough authenticator class, inferred from the reported transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasskeyKind {
    /// Removable authenticator reachable over USB/NFC/BLE
    SecurityKey,
    /// Device-bound authenticator (Touch ID, Windows Hello, phone hybrid)
    Platform,
    Unknown,
}

impl std::fmt::Display for PasskeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasskeyKind::SecurityKey => write!(f, "Security key"),
            PasskeyKind::Platform => write!(f, "Platform"),
            PasskeyKind::Unknown => write!(f, "Unknown"),
        }
    }
}

impl PasskeyDescriptor {
    /// Classify the authenticator by its transports.
    /// External transports win over `internal`/`hybrid` when both appear.
    pub fn kind(&self) -> PasskeyKind {
        let has = |t: &str| self.transports.iter().any(|x| x.eq_ignore_ascii_case(t));
        if has("usb") || has("nfc") || has("ble") {
            PasskeyKind::SecurityKey
        } else if has("internal") || has("hybrid") {
            PasskeyKind::Platform
        } else {
            PasskeyKind::Unknown
        }
    }

    /// Label for display, falling back to the authenticator class.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => self.kind().to_string(),
        }
    }
}
