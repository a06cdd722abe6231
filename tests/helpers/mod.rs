//! In-process stand-in for the dispatch backend

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use field_dispatch::services::api::HttpDispatchClient;
use field_dispatch::services::session::{Credentials, Session};

use crate::fixtures::{self, PASSWORD, USERNAME};

/// Backend-side state, inspected by the tests.
pub struct BackendState {
    /// `(job id, status)` of the technician's active job.
    pub active: Mutex<Option<(i64, String)>>,
    pub taken: Mutex<HashSet<i64>>,
    pub valid_access: Mutex<String>,
    pub refresh_token: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub refresh_allowed: AtomicBool,
    pub reject_transitions: AtomicBool,
    /// Every bearer token is refused, even freshly issued ones.
    pub revoked: AtomicBool,
    hits: Mutex<Vec<String>>,
    locations: Mutex<Vec<Value>>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            active: Mutex::new(None),
            taken: Mutex::new(HashSet::new()),
            valid_access: Mutex::new("access-1".to_string()),
            refresh_token: Mutex::new("refresh-1".to_string()),
            refresh_calls: AtomicUsize::new(0),
            refresh_allowed: AtomicBool::new(true),
            reject_transitions: AtomicBool::new(false),
            revoked: AtomicBool::new(false),
            hits: Mutex::new(Vec::new()),
            locations: Mutex::new(Vec::new()),
        }
    }

    /// Authorized requests served so far, as "METHOD path".
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    /// Requests other than location pushes and profile reads.
    pub fn actions(&self) -> Vec<String> {
        self.hits()
            .into_iter()
            .filter(|h| !h.ends_with("/location") && !h.ends_with("/my-profile"))
            .collect()
    }

    pub fn locations(&self) -> Vec<Value> {
        self.locations.lock().unwrap().clone()
    }

    pub fn location_count(&self) -> usize {
        self.locations.lock().unwrap().len()
    }

    pub fn set_active(&self, job_id: i64, status: &str) {
        *self.active.lock().unwrap() = Some((job_id, status.to_string()));
    }

    pub fn expire_access(&self, new_access: &str) {
        *self.valid_access.lock().unwrap() = new_access.to_string();
    }

    fn authorize(&self, headers: &HeaderMap, hit: String) -> Result<(), Response> {
        let expected = format!("Bearer {}", self.valid_access.lock().unwrap());
        let presented = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if presented != expected || self.revoked.load(Ordering::SeqCst) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Given token not valid for any token type"})),
            )
                .into_response());
        }
        if headers.get("x-request-id").is_none() {
            return Err((StatusCode::BAD_REQUEST, Json(json!({"detail": "missing request id"})))
                .into_response());
        }

        self.hits.lock().unwrap().push(hit);
        Ok(())
    }
}

pub struct StubBackend {
    pub base_url: String,
    pub state: Arc<BackendState>,
}

impl StubBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::new());

        let app = Router::new()
            .route("/api/auth/token", post(login))
            .route("/api/auth/token/refresh", post(refresh))
            .route("/api/dispatch/my-profile", get(my_profile))
            .route("/api/dispatch/available", get(available))
            .route("/api/dispatch/location", post(location))
            .route("/api/dispatch/{id}/accept", post(accept))
            .route("/api/dispatch/{id}/depart", post(depart))
            .route("/api/tracking/{request_id}/{step}", post(tracking))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub backend");
        let addr = listener.local_addr().expect("stub backend address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub backend crashed");
        });

        Self {
            base_url: format!("http://{addr}/api"),
            state,
        }
    }

    /// A client already holding the stub's current token pair.
    pub fn client(&self) -> HttpDispatchClient {
        let session = Session::in_memory(Some(Credentials {
            access: self.state.valid_access.lock().unwrap().clone(),
            refresh: self.state.refresh_token.lock().unwrap().clone(),
        }));
        self.client_with(Arc::new(session))
    }

    pub fn client_with(&self, session: Arc<Session>) -> HttpDispatchClient {
        HttpDispatchClient::new(&self.base_url, session, Duration::from_secs(5))
            .expect("Failed to build client")
    }
}

/// Unsigned JWT-shaped token whose `exp` claim is `exp` (unix seconds).
pub fn jwt_expiring_at(exp: i64) -> String {
    let encode = |v: Value| base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(v.to_string());
    format!(
        "{}.{}.signature",
        encode(json!({"alg": "HS256", "typ": "JWT"})),
        encode(json!({"token_type": "access", "exp": exp, "user_id": 4}))
    )
}

/// Poll `condition` every 10ms for up to two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn login(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    if body["username"] != USERNAME || body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response();
    }

    let access = state.valid_access.lock().unwrap().clone();
    let refresh = state.refresh_token.lock().unwrap().clone();
    Json(json!({"access": access, "refresh": refresh})).into_response()
}

async fn refresh(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    let count = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let known = *state.refresh_token.lock().unwrap() == body["refresh"].as_str().unwrap_or_default();

    if !state.refresh_allowed.load(Ordering::SeqCst) || !known {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired"})),
        )
            .into_response();
    }

    let access = format!("access-refreshed-{count}");
    *state.valid_access.lock().unwrap() = access.clone();
    Json(json!({"access": access})).into_response()
}

async fn my_profile(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = state.authorize(&headers, "GET /dispatch/my-profile".to_string()) {
        return denied;
    }

    let active_job = state
        .active
        .lock()
        .unwrap()
        .as_ref()
        .map(|(id, status)| fixtures::job_json(fixtures::offer(*id), status));

    Json(json!({
        "id": 4,
        "full_name": "Diego Ramos",
        "phone": "+525598765432",
        "is_available": active_job.is_none(),
        "active_job": active_job,
    }))
    .into_response()
}

async fn available(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = state.authorize(&headers, "GET /dispatch/available".to_string()) {
        return denied;
    }

    let taken = state.taken.lock().unwrap().clone();
    let offers: Vec<Value> = fixtures::OFFERS
        .iter()
        .filter(|o| !taken.contains(&o.id))
        .map(fixtures::offer_json)
        .collect();
    Json(offers).into_response()
}

async fn accept(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = state.authorize(&headers, format!("POST /dispatch/{id}/accept")) {
        return denied;
    }

    if !state.taken.lock().unwrap().insert(id) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"detail": "This job was already accepted by another technician"})),
        )
            .into_response();
    }

    state.set_active(id, "ASSIGNED");
    Json(json!({"status": "ASSIGNED"})).into_response()
}

async fn depart(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(denied) = state.authorize(&headers, format!("POST /dispatch/{id}/depart")) {
        return denied;
    }
    move_job(&state, |job_id| job_id == id, "ASSIGNED", "EN_ROUTE")
}

async fn tracking(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path((request_id, step)): Path<(i64, String)>,
) -> Response {
    if let Err(denied) = state.authorize(&headers, format!("POST /tracking/{request_id}/{step}")) {
        return denied;
    }

    let (from, to) = match step.as_str() {
        "arrived" => ("EN_ROUTE", "ARRIVED"),
        "start" => ("ARRIVED", "IN_PROGRESS"),
        "completed" => ("IN_PROGRESS", "COMPLETED"),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    move_job(
        &state,
        |job_id| fixtures::offer(job_id).request_id == request_id,
        from,
        to,
    )
}

fn move_job(state: &BackendState, matches: impl Fn(i64) -> bool, from: &str, to: &str) -> Response {
    if state.reject_transitions.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Job is no longer assigned to you"})),
        )
            .into_response();
    }

    let mut active = state.active.lock().unwrap();
    let moved = match active.as_mut() {
        Some((id, status)) if matches(*id) && status.as_str() == from => {
            *status = to.to_string();
            true
        }
        _ => false,
    };

    if !moved {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": format!("Job is not {from}")})),
        )
            .into_response();
    }
    if to == "COMPLETED" {
        *active = None;
    }
    Json(json!({"status": to})).into_response()
}

async fn location(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = state.authorize(&headers, "POST /dispatch/location".to_string()) {
        return denied;
    }
    state.locations.lock().unwrap().push(body);
    Json(json!({"ok": true})).into_response()
}
