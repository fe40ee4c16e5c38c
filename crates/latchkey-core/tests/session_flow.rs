//! End-to-end session lifecycle tests against a stub auth server.
//!
//! The stub speaks just enough of the account-management API to exercise
//! the client: bearer-checked endpoints, a counting refresh endpoint with
//! a failure switch, and an in-memory passkey collection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::future::{join_all, ready, BoxFuture};
use futures::FutureExt;
use serde_json::{json, Value};

use latchkey_core::auth::oauth::complete_google_redirect;
use latchkey_core::{
    ApiError, Authenticator, AuthenticatorAttachment, AuthenticatorError, CeremonyError, Gateway,
    Navigator, NoAuthenticator, PasskeyClient, PasskeyKind, RefreshCoordinator, SessionManager,
    TokenStore,
};

// ============================================================================
// Stub server
// ============================================================================

struct StubState {
    /// The only access token the bearer-checked endpoints accept
    valid_access: Mutex<String>,
    /// Pair handed out by a successful refresh
    rotate_to: Mutex<(String, String)>,
    last_refresh_token: Mutex<Option<String>>,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    refresh_rejects: AtomicBool,
    logout_fails: AtomicBool,
    passkeys: Mutex<Vec<Value>>,
}

#[derive(Clone)]
struct StubServer {
    inner: Arc<StubState>,
}

impl StubServer {
    fn new(valid_access: &str) -> Self {
        Self {
            inner: Arc::new(StubState {
                valid_access: Mutex::new(valid_access.to_string()),
                rotate_to: Mutex::new(("A2".to_string(), "R2".to_string())),
                last_refresh_token: Mutex::new(None),
                refresh_calls: AtomicUsize::new(0),
                logout_calls: AtomicUsize::new(0),
                refresh_rejects: AtomicBool::new(false),
                logout_fails: AtomicBool::new(false),
                passkeys: Mutex::new(Vec::new()),
            }),
        }
    }

    fn refresh_calls(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }
}

fn alice() -> Value {
    json!({ "id": 1, "username": "alice", "email": "alice@example.com" })
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn authorized(stub: &StubServer, headers: &HeaderMap) -> bool {
    bearer(headers).as_deref() == Some(stub.inner.valid_access.lock().unwrap().as_str())
}

async fn protected(State(stub): State<StubServer>, headers: HeaderMap) -> impl IntoResponse {
    if authorized(&stub, &headers) {
        (StatusCode::OK, Json(json!({ "ok": true })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "expired" })))
    }
}

async fn me(State(stub): State<StubServer>, headers: HeaderMap) -> impl IntoResponse {
    if authorized(&stub, &headers) {
        (StatusCode::OK, Json(alice()))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "expired" })))
    }
}

async fn login(State(stub): State<StubServer>, Json(body): Json<Value>) -> impl IntoResponse {
    if body["password"] == "correct horse" {
        *stub.inner.valid_access.lock().unwrap() = "A1".to_string();
        (
            StatusCode::OK,
            Json(json!({ "accessToken": "A1", "refreshToken": "R1", "user": alice() })),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad credentials" })))
    }
}

async fn refresh(State(stub): State<StubServer>, Json(body): Json<Value>) -> impl IntoResponse {
    stub.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
    *stub.inner.last_refresh_token.lock().unwrap() =
        body["refreshToken"].as_str().map(str::to_string);

    if stub.inner.refresh_rejects.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "refresh token revoked" })));
    }

    let (access, refresh) = stub.inner.rotate_to.lock().unwrap().clone();
    *stub.inner.valid_access.lock().unwrap() = access.clone();
    (
        StatusCode::OK,
        Json(json!({ "accessToken": access, "refreshToken": refresh })),
    )
}

async fn logout(State(stub): State<StubServer>, Json(_body): Json<Value>) -> impl IntoResponse {
    stub.inner.logout_calls.fetch_add(1, Ordering::SeqCst);
    if stub.inner.logout_fails.load(Ordering::SeqCst) {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })))
    } else {
        (StatusCode::OK, Json(json!({ "ok": true })))
    }
}

async fn register_options(State(_stub): State<StubServer>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "challenge": "creation-challenge" })))
}

async fn register_finish(
    State(stub): State<StubServer>,
    Json(attestation): Json<Value>,
) -> impl IntoResponse {
    let descriptor = json!({
        "credentialId": attestation["id"],
        "label": "Test key",
        "transports": attestation["transports"],
        "createdAt": null,
        "lastUsedAt": null,
    });
    stub.inner.passkeys.lock().unwrap().push(descriptor);
    (StatusCode::OK, Json(json!({ "verified": true })))
}

async fn authenticate_options(State(_stub): State<StubServer>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "challenge": "assertion-challenge" })))
}

async fn authenticate_finish(
    State(stub): State<StubServer>,
    Json(_assertion): Json<Value>,
) -> impl IntoResponse {
    *stub.inner.valid_access.lock().unwrap() = "PA".to_string();
    (
        StatusCode::OK,
        Json(json!({ "accessToken": "PA", "refreshToken": "PR", "user": alice() })),
    )
}

async fn list_passkeys(State(stub): State<StubServer>) -> impl IntoResponse {
    let passkeys = stub.inner.passkeys.lock().unwrap().clone();
    (StatusCode::OK, Json(Value::Array(passkeys)))
}

async fn delete_passkey(
    State(stub): State<StubServer>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    // Deleting an absent id is the normal response, per the server contract.
    stub.inner
        .passkeys
        .lock()
        .unwrap()
        .retain(|p| p["credentialId"] != id.as_str());
    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn spawn_stub(valid_access: &str) -> (StubServer, String) {
    let stub = StubServer::new(valid_access);
    let app = Router::new()
        .route("/protected", get(protected))
        .route("/auth/me", get(me))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/passkey/register/options", post(register_options))
        .route("/passkey/register", post(register_finish))
        .route("/passkey/authenticate/options", post(authenticate_options))
        .route("/passkey/authenticate", post(authenticate_finish))
        .route("/passkey/list", get(list_passkeys))
        .route("/passkey/:id", delete(delete_passkey))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server died");
    });
    (stub, format!("http://{}", addr))
}

// ============================================================================
// Client-side test doubles
// ============================================================================

struct CountingNavigator {
    targets: Mutex<Vec<String>>,
}

impl CountingNavigator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            targets: Mutex::new(Vec::new()),
        })
    }

    fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl Navigator for CountingNavigator {
    fn redirect_to(&self, target: &str) {
        self.targets.lock().unwrap().push(target.to_string());
    }
}

/// Authenticator that answers every ceremony with a fixed response.
struct ScriptedAuthenticator {
    response: Value,
}

impl Authenticator for ScriptedAuthenticator {
    fn webauthn_supported(&self) -> bool {
        true
    }

    fn platform_authenticator_available(&self) -> BoxFuture<'_, Result<bool, AuthenticatorError>> {
        ready(Ok(true)).boxed()
    }

    fn conditional_mediation_available(&self) -> BoxFuture<'_, Result<bool, AuthenticatorError>> {
        ready(Ok(false)).boxed()
    }

    fn create_credential(&self, _options: Value) -> BoxFuture<'_, Result<Value, AuthenticatorError>> {
        ready(Ok(self.response.clone())).boxed()
    }

    fn get_assertion(&self, _options: Value) -> BoxFuture<'_, Result<Value, AuthenticatorError>> {
        ready(Ok(self.response.clone())).boxed()
    }
}

/// Authenticator whose user dismisses every ceremony.
struct CancellingAuthenticator;

impl Authenticator for CancellingAuthenticator {
    fn webauthn_supported(&self) -> bool {
        true
    }

    fn platform_authenticator_available(&self) -> BoxFuture<'_, Result<bool, AuthenticatorError>> {
        ready(Ok(true)).boxed()
    }

    fn conditional_mediation_available(&self) -> BoxFuture<'_, Result<bool, AuthenticatorError>> {
        ready(Ok(false)).boxed()
    }

    fn create_credential(&self, _options: Value) -> BoxFuture<'_, Result<Value, AuthenticatorError>> {
        ready(Err(AuthenticatorError::Cancelled)).boxed()
    }

    fn get_assertion(&self, _options: Value) -> BoxFuture<'_, Result<Value, AuthenticatorError>> {
        ready(Err(AuthenticatorError::Cancelled)).boxed()
    }
}

struct Harness {
    stub: StubServer,
    navigator: Arc<CountingNavigator>,
    store: TokenStore,
    gateway: Gateway,
    session: SessionManager,
}

async fn harness(valid_access: &str) -> Harness {
    let (stub, base_url) = spawn_stub(valid_access).await;
    let navigator = CountingNavigator::new();
    let store = TokenStore::in_memory();
    let refresher = RefreshCoordinator::new(&base_url, store.clone(), navigator.clone())
        .expect("coordinator build failed");
    let gateway = Gateway::new(&base_url, store.clone(), refresher).expect("gateway build failed");
    let session = SessionManager::new(gateway.clone(), store.clone());
    Harness {
        stub,
        navigator,
        store,
        gateway,
        session,
    }
}

// ============================================================================
// Refresh behavior
// ============================================================================

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_retried() {
    let h = harness("A2").await;
    h.store.set_tokens("A1", "R1").expect("set_tokens failed");

    // A1 is expired as far as the server is concerned; the gateway must
    // refresh with R1 and retry with A2, invisibly to the caller.
    let body: Value = h.gateway.get("/protected").await.expect("request failed");
    assert_eq!(body["ok"], true);

    assert_eq!(h.stub.refresh_calls(), 1);
    assert_eq!(
        h.stub.inner.last_refresh_token.lock().unwrap().as_deref(),
        Some("R1")
    );
    assert_eq!(h.store.access_token().as_deref(), Some("A2"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_concurrent_401s_coalesce_into_one_refresh() {
    let h = harness("A2").await;
    h.store.set_tokens("A1", "R1").expect("set_tokens failed");

    let requests: Vec<_> = (0..8)
        .map(|_| h.gateway.get::<Value>("/protected"))
        .collect();
    let results = join_all(requests).await;

    for result in results {
        let body = result.expect("request failed");
        assert_eq!(body["ok"], true);
    }
    // The single-flight invariant: eight rejected requests, one refresh.
    assert_eq!(h.stub.refresh_calls(), 1);
    assert_eq!(h.store.access_token().as_deref(), Some("A2"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_rejected_refresh_forces_logout_exactly_once() {
    let h = harness("A2").await;
    h.store.set_tokens("A1", "R1").expect("set_tokens failed");
    h.stub.inner.refresh_rejects.store(true, Ordering::SeqCst);

    let requests: Vec<_> = (0..4)
        .map(|_| h.gateway.get::<Value>("/protected"))
        .collect();
    let results = join_all(requests).await;

    for result in results {
        let err = result.expect_err("request should fail");
        assert!(matches!(err, ApiError::RefreshFailed(_)), "got {err}");
    }
    assert_eq!(h.stub.refresh_calls(), 1);
    assert_eq!(h.navigator.targets(), ["/login"]);
    assert!(!h.store.is_authenticated());
}

#[tokio::test]
async fn test_request_without_any_session_is_not_retried() {
    let h = harness("A2").await;

    // With no refresh token there is nothing to recover with; the caller
    // sees the original rejection and no refresh is attempted.
    let err = h
        .gateway
        .get::<Value>("/protected")
        .await
        .expect_err("request should fail");
    assert!(matches!(err, ApiError::Unauthorized));
    assert_eq!(h.stub.refresh_calls(), 0);
    assert!(h.navigator.targets().is_empty());
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_password_login_projects_state_and_stores_pair() {
    let h = harness("A0").await;

    let user = h
        .session
        .login_with_password("alice", "correct horse")
        .await
        .expect("login failed");
    assert_eq!(user.username, "alice");

    let state = h.session.state();
    assert!(state.is_authenticated);
    assert_eq!(state.user.expect("user missing").username, "alice");
    assert_eq!(h.store.access_token().as_deref(), Some("A1"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("R1"));

    // A fresh initialize confirms the same identity against the server.
    let state = h.session.initialize().await;
    assert!(state.is_authenticated);
}

#[tokio::test]
async fn test_initialize_self_heals_when_session_is_dead() {
    let h = harness("A2").await;
    h.store.set_tokens("stale", "also-stale").expect("set_tokens failed");
    h.stub.inner.refresh_rejects.store(true, Ordering::SeqCst);

    let state = h.session.initialize().await;

    // Dead tokens are a normal state: no error, just logged out.
    assert!(!state.is_authenticated);
    assert!(state.user.is_none());
    assert!(!state.loading);
    assert!(!h.store.is_authenticated());
    assert_eq!(h.navigator.targets(), ["/login"]);
}

#[tokio::test]
async fn test_logout_clears_locally_even_when_server_errors() {
    let h = harness("A1").await;
    h.session
        .login("A1", "R1", serde_json::from_value(alice()).expect("bad user"))
        .expect("login failed");
    h.stub.inner.logout_fails.store(true, Ordering::SeqCst);

    h.session.logout().await;

    assert_eq!(h.stub.inner.logout_calls.load(Ordering::SeqCst), 1);
    assert!(!h.store.is_authenticated());
    assert!(!h.session.state().is_authenticated);
    assert!(h.session.state().user.is_none());
}

// ============================================================================
// Passkey ceremonies
// ============================================================================

#[tokio::test]
async fn test_registration_ceremony_adds_a_passkey() {
    let h = harness("A2").await;
    h.store.set_tokens("A2", "R2").expect("set_tokens failed");

    let authenticator = ScriptedAuthenticator {
        response: json!({ "id": "cred-1", "transports": ["internal"] }),
    };
    let client = PasskeyClient::new(h.gateway.clone(), authenticator);

    let receipt = client
        .register(Some(AuthenticatorAttachment::Platform))
        .await
        .expect("registration failed");
    assert_eq!(receipt["verified"], true);

    let passkeys = client.list().await.expect("list failed");
    assert_eq!(passkeys.len(), 1);
    assert_eq!(passkeys[0].credential_id, "cred-1");
    assert_eq!(passkeys[0].kind(), PasskeyKind::Platform);
}

#[tokio::test]
async fn test_cancelled_registration_leaves_no_state_behind() {
    let h = harness("A2").await;
    h.store.set_tokens("A2", "R2").expect("set_tokens failed");

    let client = PasskeyClient::new(h.gateway.clone(), CancellingAuthenticator);
    let err = client
        .register(Some(AuthenticatorAttachment::Platform))
        .await
        .expect_err("ceremony should fail");
    assert!(matches!(err, CeremonyError::Cancelled));

    // Tokens untouched, nothing registered.
    assert_eq!(h.store.access_token().as_deref(), Some("A2"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("R2"));
    assert!(client.list().await.expect("list failed").is_empty());
}

#[tokio::test]
async fn test_passkey_authentication_returns_fresh_session() {
    let h = harness("A0").await;

    let authenticator = ScriptedAuthenticator {
        response: json!({ "id": "cred-1" }),
    };
    let client = PasskeyClient::new(h.gateway.clone(), authenticator);

    let login = client.authenticate(None).await.expect("authentication failed");
    assert_eq!(login.access_token, "PA");
    assert_eq!(login.refresh_token, "PR");

    h.session
        .login(&login.access_token, &login.refresh_token, login.user)
        .expect("login failed");
    assert!(h.session.state().is_authenticated);
    assert_eq!(h.store.access_token().as_deref(), Some("PA"));

    // The fresh pair really works against a bearer-checked endpoint.
    let me: Value = h.gateway.get("/auth/me").await.expect("me failed");
    assert_eq!(me["username"], "alice");
}

#[tokio::test]
async fn test_delete_passkey_is_idempotent_on_absence() {
    let h = harness("A2").await;
    h.store.set_tokens("A2", "R2").expect("set_tokens failed");

    // list/delete are plain CRUD and never consult the authenticator.
    let client = PasskeyClient::new(h.gateway.clone(), NoAuthenticator);
    client.delete("never-existed").await.expect("delete should pass through");
}

// ============================================================================
// OAuth completion
// ============================================================================

#[tokio::test]
async fn test_oauth_redirect_completion_consumes_tokens_once() {
    let h = harness("A2").await;

    let (user, cleaned) = complete_google_redirect(
        &h.session,
        "http://app.local/oauth/callback?accessToken=A2&refreshToken=R2&next=%2Fsettings",
    )
    .await
    .expect("completion failed");

    assert_eq!(user.username, "alice");
    assert_eq!(cleaned, "http://app.local/oauth/callback?next=%2Fsettings");
    assert_eq!(h.store.access_token().as_deref(), Some("A2"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("R2"));
    assert!(h.session.state().is_authenticated);
}

#[tokio::test]
async fn test_oauth_redirect_with_dead_tokens_is_discarded() {
    let h = harness("A2").await;
    h.stub.inner.refresh_rejects.store(true, Ordering::SeqCst);

    let err = complete_google_redirect(
        &h.session,
        "http://app.local/oauth/callback?accessToken=bogus&refreshToken=bogus",
    )
    .await
    .expect_err("completion should fail");
    assert!(err.is_session_expired(), "got {err}");

    assert!(!h.store.is_authenticated());
    assert!(!h.session.state().is_authenticated);
}
