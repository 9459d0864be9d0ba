//! End-to-end checks against an in-process fake of the platform API.
//!
//! The fake issues real `Set-Cookie` headers, so these tests exercise the
//! reqwest cookie store, the refresh-and-replay path and the session manager
//! together, the way the CLI runs them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::{Value, json};

use unihub::gate::{GateView, RouteParams};
use unihub::services::notifications::{self, Notification};
use unihub::state::auth::AuthStatus;
use unihub::{ApiError, ClientConfig, Hub};

const ACCESS_COOKIE: &str = "access_token";
const REFRESH_COOKIE: &str = "refresh_token";

// =============================================================================
// FAKE API
// =============================================================================

#[derive(Default)]
struct FakeState {
    passwords: HashMap<i64, String>,
    access: HashMap<String, i64>,
    refresh: HashMap<String, i64>,
    next_token: u64,
    refresh_calls: usize,
}

impl FakeState {
    fn token(&mut self, prefix: &str) -> String {
        self.next_token += 1;
        format!("{prefix}-{}", self.next_token)
    }
}

#[derive(Clone, Default)]
struct Fake(Arc<Mutex<FakeState>>);

impl Fake {
    fn with_user(account: i64, password: &str) -> Self {
        let fake = Self::default();
        fake.0.lock().unwrap().passwords.insert(account, password.to_owned());
        fake
    }

    fn expire_access_tokens(&self) {
        self.0.lock().unwrap().access.clear();
    }

    fn revoke_refresh_tokens(&self) {
        self.0.lock().unwrap().refresh.clear();
    }

    fn refresh_calls(&self) -> usize {
        self.0.lock().unwrap().refresh_calls
    }

    fn account(&self, jar: &CookieJar) -> Option<i64> {
        let token = jar.get(ACCESS_COOKIE)?.value().to_owned();
        self.0.lock().unwrap().access.get(&token).copied()
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Given token not valid for any token type" }))).into_response()
}

fn cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value)).path("/").http_only(true).build()
}

async fn login(State(fake): State<Fake>, jar: CookieJar, Json(body): Json<Value>) -> Response {
    let account = body.get("accountID").and_then(|v| v.as_str()?.parse::<i64>().ok());
    let password = body.get("password").and_then(Value::as_str);
    let mut state = fake.0.lock().unwrap();
    let valid = account.is_some_and(|id| state.passwords.get(&id).map(String::as_str) == password);
    let Some(account) = account.filter(|_| valid) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid email or password" }))).into_response();
    };

    let access = state.token("a");
    let refresh = state.token("r");
    state.access.insert(access.clone(), account);
    state.refresh.insert(refresh.clone(), account);
    let jar = jar.add(cookie(ACCESS_COOKIE, access)).add(cookie(REFRESH_COOKIE, refresh));
    (jar, Json(json!({ "success": true }))).into_response()
}

async fn refresh(State(fake): State<Fake>, jar: CookieJar) -> Response {
    let mut state = fake.0.lock().unwrap();
    state.refresh_calls += 1;
    let account = jar.get(REFRESH_COOKIE).and_then(|c| state.refresh.get(c.value()).copied());
    let Some(account) = account else {
        return unauthorized();
    };
    let access = state.token("a");
    state.access.insert(access.clone(), account);
    (jar.add(cookie(ACCESS_COOKIE, access)), Json(json!({ "refreshed": true }))).into_response()
}

async fn authenticated(State(fake): State<Fake>, jar: CookieJar) -> Response {
    match fake.account(&jar) {
        Some(account) => Json(json!({ "authenticated": true, "accountID": account })).into_response(),
        None => unauthorized(),
    }
}

async fn logout(State(fake): State<Fake>, jar: CookieJar) -> Response {
    let mut state = fake.0.lock().unwrap();
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        if let Some(c) = jar.get(name) {
            state.access.remove(c.value());
            state.refresh.remove(c.value());
        }
    }
    let jar = jar.remove(Cookie::build(ACCESS_COOKIE).path("/")).remove(Cookie::build(REFRESH_COOKIE).path("/"));
    (jar, Json(json!({ "message": "Logged out" }))).into_response()
}

async fn notification_list(State(fake): State<Fake>, jar: CookieJar) -> Response {
    let Some(account) = fake.account(&jar) else {
        return unauthorized();
    };
    Json(json!([
        { "id": 2, "message": format!("welcome {account}"), "created_at": "2025-03-02T09:00:00Z", "is_read": false },
        { "id": 1, "message": "Chess Club event tomorrow", "created_at": "2025-03-01T09:00:00Z", "is_read": true }
    ]))
    .into_response()
}

async fn admin_check(State(fake): State<Fake>, jar: CookieJar) -> Response {
    match fake.account(&jar) {
        Some(_) => Json(json!({ "admin": "yes" })).into_response(),
        None => unauthorized(),
    }
}

async fn serve(fake: Fake) -> String {
    let app = Router::new()
        .route("/api/login/", post(login))
        .route("/api/logout/", post(logout))
        .route("/api/token/refresh/", post(refresh))
        .route("/api/authenticated/", post(authenticated))
        .route("/api/notifications/", get(notification_list))
        .route("/api/admin_check/", post(admin_check))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/api")
}

async fn hub(base_url: &str) -> Hub {
    let config = ClientConfig::default().with_base_url(base_url).unwrap();
    let hub = Hub::new(config).unwrap();
    hub.startup().await;
    hub
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test]
async fn startup_without_cookies_is_unauthenticated() {
    let base = serve(Fake::with_user(7, "pw")).await;
    let hub = hub(&base).await;

    assert_eq!(hub.session().snapshot().status(), &AuthStatus::Unauthenticated);
    assert_eq!(hub.plain_gate().navigate(&RouteParams::new()).await, Some(GateView::Redirect("/")));
}

#[tokio::test]
async fn login_sets_cookies_that_later_calls_carry() {
    let base = serve(Fake::with_user(7, "pw")).await;
    let hub = hub(&base).await;

    hub.session().login("7", "pw").await.unwrap();
    hub.session().check_authentication().await;

    let state = hub.session().snapshot();
    assert_eq!(state.account_id().map(|id| id.as_str().to_owned()), Some("7".to_owned()));
}

#[tokio::test]
async fn rejected_login_surfaces_server_message() {
    let base = serve(Fake::with_user(7, "pw")).await;
    let hub = hub(&base).await;

    let err = hub.session().login("7", "nope").await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid email or password");
    assert!(!hub.session().snapshot().is_authenticated());
}

#[tokio::test]
async fn expired_access_cookie_is_refreshed_transparently() {
    let fake = Fake::with_user(7, "pw");
    let base = serve(fake.clone()).await;
    let hub = hub(&base).await;
    hub.session().login("7", "pw").await.unwrap();
    let refreshes_before = fake.refresh_calls();

    fake.expire_access_tokens();
    let transparent = notifications::fetch_notifications(hub.api()).await.unwrap();
    assert_eq!(fake.refresh_calls(), refreshes_before + 1);

    fake.expire_access_tokens();
    assert!(hub.api().refresh().await);
    let manual: Vec<Notification> = notifications::fetch_notifications(hub.api()).await.unwrap();

    assert_eq!(transparent, manual);
    assert_eq!(notifications::unread_count(&transparent), 1);
    assert!(hub.session().snapshot().is_authenticated());
}

#[tokio::test]
async fn revoked_refresh_token_ends_session() {
    let fake = Fake::with_user(7, "pw");
    let base = serve(fake.clone()).await;
    let hub = hub(&base).await;
    hub.session().login("7", "pw").await.unwrap();

    fake.expire_access_tokens();
    fake.revoke_refresh_tokens();
    let err = notifications::fetch_notifications(hub.api()).await.unwrap_err();

    assert_eq!(err, ApiError::RefreshFailed);
    assert_eq!(err.to_string(), "Authentication failed");
    assert_eq!(hub.session().snapshot().status(), &AuthStatus::Unauthenticated);
}

#[tokio::test]
async fn logout_drops_server_session() {
    let base = serve(Fake::with_user(7, "pw")).await;
    let hub = hub(&base).await;
    hub.session().login("7", "pw").await.unwrap();

    hub.session().logout().await;
    hub.session().check_authentication().await;
    assert_eq!(hub.session().snapshot().status(), &AuthStatus::Unauthenticated);
}

#[tokio::test]
async fn non_boolean_admin_flag_is_denied() {
    let base = serve(Fake::with_user(7, "pw")).await;
    let hub = hub(&base).await;
    hub.session().login("7", "pw").await.unwrap();

    let gate = hub.scoped_gate(unihub::gate::CapabilityKind::Admin);
    assert_eq!(gate.navigate(&RouteParams::new()).await, Some(GateView::NoPermission));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let hub = hub(&format!("http://{addr}/api")).await;
    let err = notifications::fetch_notifications(hub.api()).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
    assert_eq!(hub.session().snapshot().status(), &AuthStatus::Unauthenticated);
}
