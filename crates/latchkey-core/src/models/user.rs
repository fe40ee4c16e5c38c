use serde::{Deserialize, Serialize};

/// The authenticated user as reported by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    pub id: Option<i64>,
    pub username: String,
    pub email: Option<String>,
}

/// Response to a successful password, passkey, or recovery-code login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    pub user: UserProfile,
}

/// Which sign-in methods are configured for the account.
/// Drives the "set password" vs "change password" distinction in front-ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AccountStatus {
    #[serde(rename = "hasPassword")]
    pub has_password: bool,
    #[serde(rename = "hasGoogle")]
    pub has_google: bool,
    #[serde(rename = "hasPasskey")]
    pub has_passkey: bool,
    #[serde(rename = "passkeyCount")]
    pub passkey_count: i64,
}

/// Freshly generated recovery codes. Shown once, never retrievable again.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryCodes {
    pub codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RecoveryStatus {
    #[serde(rename = "hasCodes")]
    pub has_codes: bool,
    #[serde(rename = "codesRemaining")]
    pub codes_remaining: i64,
}
