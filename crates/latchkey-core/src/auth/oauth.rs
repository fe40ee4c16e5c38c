//! Google OAuth hand-off.
//!
//! Sign-in happens on the server (`/oauth2/authorization/google`); the
//! client's part is the redirect back, which carries a fresh token pair as
//! query parameters. Those parameters are consumed exactly once: stored,
//! confirmed against `/auth/me`, and stripped from the URL so they never
//! linger in history or logs.

use tracing::warn;
use url::Url;

use crate::api::{normalize_base_url, ApiError};
use crate::auth::session::SessionManager;
use crate::auth::Navigator;
use crate::models::UserProfile;

/// Server route that starts the Google authorization code flow.
pub const GOOGLE_AUTHORIZATION_PATH: &str = "/oauth2/authorization/google";

const ACCESS_TOKEN_PARAM: &str = "accessToken";
const REFRESH_TOKEN_PARAM: &str = "refreshToken";

/// Hand the user agent to the server-side Google flow.
pub fn begin_google(base_url: &str, navigator: &dyn Navigator) {
    let target = format!(
        "{}{}",
        normalize_base_url(base_url),
        GOOGLE_AUTHORIZATION_PATH
    );
    navigator.redirect_to(&target);
}

/// Finish the flow from the redirect URL the server sent the user agent to.
/// On success returns the confirmed user and the redirect URL with the
/// token parameters removed; on failure the received tokens are discarded
/// and the store is left logged out.
pub async fn complete_google_redirect(
    session: &SessionManager,
    redirect_url: &str,
) -> Result<(UserProfile, String), ApiError> {
    let (access, refresh, cleaned) = extract_tokens(redirect_url)?;
    session.store().set_tokens(&access, &refresh)?;

    match session.gateway().get::<UserProfile>("/auth/me").await {
        Ok(user) => {
            session.set_user(user.clone());
            Ok((user, cleaned))
        }
        Err(err) => {
            warn!(error = %err, "OAuth completion failed, discarding received tokens");
            if let Err(err) = session.store().clear_tokens() {
                warn!(error = %err, "Failed to clear stored credentials");
            }
            Err(err)
        }
    }
}

/// Pull the token pair out of the redirect URL, returning the pair and the
/// URL with the token parameters stripped (other parameters survive).
fn extract_tokens(redirect_url: &str) -> Result<(String, String, String), ApiError> {
    let mut url = Url::parse(redirect_url)
        .map_err(|err| ApiError::InvalidResponse(format!("bad redirect URL: {err}")))?;

    let mut access = None;
    let mut refresh = None;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, value)| match key.as_ref() {
            ACCESS_TOKEN_PARAM => {
                access = Some(value.into_owned());
                None
            }
            REFRESH_TOKEN_PARAM => {
                refresh = Some(value.into_owned());
                None
            }
            _ => Some((key.into_owned(), value.into_owned())),
        })
        .collect();

    let (Some(access), Some(refresh)) = (access, refresh) else {
        return Err(ApiError::InvalidResponse(
            "redirect did not carry a token pair".to_string(),
        ));
    };

    if retained.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        drop(pairs);
    }

    Ok((access, refresh, url.to_string()))
}
