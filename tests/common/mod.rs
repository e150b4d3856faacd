//! In-process mock of the dashboard backend, bound to an ephemeral localhost port.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use buildops::config::{AuthMode, ClientConfig};
use buildops::session::{unsigned_token, MemoryStorage, SessionStorage};
use buildops::HttpClient;

#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    Rotate { jwt: String, refresh: String },
    Status(u16),
    Unsuccessful,
}

#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub tenant: Option<String>,
    pub cookie: Option<String>,
}

pub struct MockState {
    pub refresh_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub always_unauthorized: AtomicBool,
    pub logout_fails: AtomicBool,
    pub valid_token: Mutex<String>,
    pub refresh_behavior: Mutex<RefreshBehavior>,
    pub refresh_delay: Mutex<Duration>,
    pub refresh_bodies: Mutex<Vec<Value>>,
    pub seen: Mutex<Vec<Seen>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            always_unauthorized: AtomicBool::new(false),
            logout_fails: AtomicBool::new(false),
            valid_token: Mutex::new("B".into()),
            refresh_behavior: Mutex::new(RefreshBehavior::Rotate { jwt: "B".into(), refresh: "R2".into() }),
            refresh_delay: Mutex::new(Duration::from_millis(0)),
            refresh_bodies: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl MockState {
    pub fn refreshes(&self) -> usize { self.refresh_calls.load(Ordering::SeqCst) }

    pub fn seen_on(&self, path: &str) -> Vec<Seen> {
        self.seen.lock().iter().filter(|s| s.path == path).cloned().collect()
    }

    pub fn with_bearer(&self, path: &str, token: &str) -> usize {
        let want = format!("Bearer {}", token);
        self.seen_on(path).iter().filter(|s| s.authorization.as_deref() == Some(want.as_str())).count()
    }
}

pub fn login_jwt() -> String {
    unsigned_token(&json!({
        "nameid": "42",
        "email": "ada@acme.test",
        "given_name": "Ada",
        "family_name": "Bauer",
        "http://schemas.microsoft.com/ws/2008/06/identity/claims/role": "SiteManager",
        "tenant": "acme",
        "permissions": ["Vehicles.Read"],
        "exp": 4_000_000_000i64
    }))
}

async fn login(State(s): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    s.login_calls.fetch_add(1, Ordering::SeqCst);
    if body["password"] != "correct" {
        return Json(json!({
            "jwt": null, "refreshToken": null, "messages": ["Invalid credentials"], "isSuccessfull": false
        }))
        .into_response();
    }
    let jwt = login_jwt();
    *s.valid_token.lock() = jwt.clone();
    (
        [(header::SET_COOKIE, "session=cookie-1; Path=/")],
        Json(json!({
            "jwt": jwt, "refreshToken": "R1",
            "refreshTokenExpirationDate": "2026-12-01T00:00:00", "messages": [], "isSuccessfull": true
        })),
    )
        .into_response()
}

async fn refresh(State(s): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    s.refresh_calls.fetch_add(1, Ordering::SeqCst);
    s.refresh_bodies.lock().push(body);
    let delay = *s.refresh_delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let behavior = s.refresh_behavior.lock().clone();
    match behavior {
        RefreshBehavior::Rotate { jwt, refresh } => {
            *s.valid_token.lock() = jwt.clone();
            Json(json!({"jwt": jwt, "refreshToken": refresh, "messages": [], "isSuccessfull": true})).into_response()
        }
        RefreshBehavior::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({"messages": ["refresh exploded"], "isSuccessfull": false}))).into_response()
        }
        RefreshBehavior::Unsuccessful => {
            Json(json!({"jwt": null, "refreshToken": null, "messages": ["Refresh token expired"], "isSuccessfull": false}))
                .into_response()
        }
    }
}

async fn logout(State(s): State<Arc<MockState>>) -> StatusCode {
    s.logout_calls.fetch_add(1, Ordering::SeqCst);
    if s.logout_fails.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::NO_CONTENT
}

async fn api(State(s): State<Arc<MockState>>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    let path = uri.path().to_string();
    s.seen.lock().push(Seen {
        method: method.to_string(),
        path: path.clone(),
        authorization: get("authorization"),
        tenant: get("tenant"),
        cookie: get("cookie"),
    });

    match path.as_str() {
        "/api/Public" => return Json(json!({"public": true})).into_response(),
        "/api/Text" => return ([(header::CONTENT_TYPE, "text/plain")], "hello crew").into_response(),
        "/api/Slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            return Json(json!({"slow": true})).into_response();
        }
        "/api/CookieOnly" => {
            let ok = get("cookie").map(|c| c.contains("session=cookie-1")).unwrap_or(false);
            return if ok {
                Json(json!({"cookie": true})).into_response()
            } else {
                (StatusCode::UNAUTHORIZED, Json(json!({"message": "no session"}))).into_response()
            };
        }
        _ => {}
    }

    let want = format!("Bearer {}", s.valid_token.lock());
    if s.always_unauthorized.load(Ordering::SeqCst) || get("authorization").as_deref() != Some(want.as_str()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "token expired"}))).into_response();
    }
    match path.as_str() {
        "/api/NoContent" => StatusCode::NO_CONTENT.into_response(),
        "/api/Missing" => (StatusCode::NOT_FOUND, Json(json!({"title": "Vehicle not found"}))).into_response(),
        _ => Json(json!({"ok": true, "path": path, "method": method.to_string()})).into_response(),
    }
}

/// Start the mock and return its state and base URL.
pub async fn start_backend() -> (Arc<MockState>, String) {
    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route("/api/Token/login", post(login))
        .route("/api/Token/refresh-token", post(refresh))
        .route("/api/Token/logout", post(logout))
        .fallback(api)
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("mock backend error: {e:?}");
        }
    });
    (state, format!("http://{}", addr))
}

pub fn client_for(base: &str, mode: AuthMode) -> HttpClient {
    client_with(ClientConfig::new(base).with_auth_mode(mode), Arc::new(MemoryStorage::new()))
}

pub fn client_with(config: ClientConfig, storage: Arc<dyn SessionStorage>) -> HttpClient {
    HttpClient::with_storage(config, storage).expect("build client")
}
