/*!
Stub HTTP de l'API N-central pour tests sans serveur réel

Démarre un serveur axum sur un port éphémère qui implémente :
- POST /api/auth/authenticate (JWT -> access token)
- GET /api/devices (pagination via `_links.nextPage`)
- GET /api/devices/{id}/service-monitor-status

Les pannes (auth refusée, listing en erreur, sonde en erreur) sont configurables,
y compris à chaud pendant un test.
*/

use axum::extract::{Path, Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use anyhow::Result;

const ACCESS_TOKEN: &str = "stub-access-token";

#[derive(Default)]
struct Counters {
    auth: AtomicUsize,
    pages: AtomicUsize,
    probes: AtomicUsize,
}

struct StubState {
    jwt: String,
    page_size: usize,
    devices: Mutex<Vec<Value>>,
    services: Mutex<HashMap<String, Vec<Value>>>,
    auth_failure: Mutex<Option<u16>>,
    devices_failure: Mutex<Option<u16>>,
    service_failures: Mutex<HashMap<String, u16>>,
    counters: Counters,
}

/// Configuration du stub avant démarrage
pub struct NableStubBuilder {
    jwt: String,
    page_size: usize,
    devices: Vec<Value>,
    services: HashMap<String, Vec<Value>>,
    auth_failure: Option<u16>,
    devices_failure: Option<u16>,
    service_failures: HashMap<String, u16>,
}

impl NableStubBuilder {
    fn new() -> Self {
        Self {
            jwt: "stub-jwt".to_string(),
            page_size: 1000,
            devices: Vec::new(),
            services: HashMap::new(),
            auth_failure: None,
            devices_failure: None,
            service_failures: HashMap::new(),
        }
    }

    pub fn jwt(mut self, jwt: &str) -> Self {
        self.jwt = jwt.to_string();
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn devices(mut self, devices: Vec<Value>) -> Self {
        self.devices = devices;
        self
    }

    pub fn device(mut self, device: Value) -> Self {
        self.devices.push(device);
        self
    }

    /// Entrées renvoyées par service-monitor-status pour ce device
    pub fn services(mut self, device_id: &str, entries: Vec<Value>) -> Self {
        self.services.insert(device_id.to_string(), entries);
        self
    }

    pub fn fail_auth(mut self, status: u16) -> Self {
        self.auth_failure = Some(status);
        self
    }

    pub fn fail_devices(mut self, status: u16) -> Self {
        self.devices_failure = Some(status);
        self
    }

    pub fn fail_services(mut self, device_id: &str, status: u16) -> Self {
        self.service_failures.insert(device_id.to_string(), status);
        self
    }

    /// Démarre le serveur sur 127.0.0.1 avec un port libre
    pub async fn spawn(self) -> Result<NableStub> {
        let state = Arc::new(StubState {
            jwt: self.jwt,
            page_size: self.page_size,
            devices: Mutex::new(self.devices),
            services: Mutex::new(self.services),
            auth_failure: Mutex::new(self.auth_failure),
            devices_failure: Mutex::new(self.devices_failure),
            service_failures: Mutex::new(self.service_failures),
            counters: Counters::default(),
        });

        let app = Router::new()
            .route("/api/auth/authenticate", post(authenticate))
            .route("/api/devices", get(list_devices))
            .route("/api/devices/{id}/service-monitor-status", get(service_status))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[STUB] server error: {}", e);
            }
        });

        log::info!("🧪 [STUB] N-central API listening on {}", addr);
        Ok(NableStub { addr, state, handle })
    }
}

/// Serveur stub démarré ; arrêté au drop
pub struct NableStub {
    addr: SocketAddr,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl NableStub {
    pub fn builder() -> NableStubBuilder {
        NableStubBuilder::new()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn jwt(&self) -> &str {
        &self.state.jwt
    }

    pub fn auth_requests(&self) -> usize {
        self.state.counters.auth.load(Ordering::SeqCst)
    }

    pub fn page_requests(&self) -> usize {
        self.state.counters.pages.load(Ordering::SeqCst)
    }

    pub fn probe_requests(&self) -> usize {
        self.state.counters.probes.load(Ordering::SeqCst)
    }

    pub fn set_devices(&self, devices: Vec<Value>) {
        *self.state.devices.lock().unwrap() = devices;
    }

    /// `None` rétablit un listing normal
    pub fn set_devices_failure(&self, status: Option<u16>) {
        *self.state.devices_failure.lock().unwrap() = status;
    }

    pub fn set_auth_failure(&self, status: Option<u16>) {
        *self.state.auth_failure.lock().unwrap() = status;
    }
}

impl Drop for NableStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn status_response(code: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, message.to_string()).into_response()
}

async fn authenticate(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    state.counters.auth.fetch_add(1, Ordering::SeqCst);

    if let Some(code) = *state.auth_failure.lock().unwrap() {
        return status_response(code, "authentication failure (stub)");
    }
    if bearer(&headers) != Some(state.jwt.as_str()) {
        return status_response(401, "invalid token");
    }
    Json(json!({
        "tokens": {
            "access": {"token": ACCESS_TOKEN, "expirySeconds": 3600},
            "refresh": {"token": "stub-refresh-token", "expirySeconds": 90000}
        }
    }))
    .into_response()
}

async fn list_devices(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.counters.pages.fetch_add(1, Ordering::SeqCst);

    if bearer(&headers) != Some(ACCESS_TOKEN) {
        return status_response(401, "missing access token");
    }
    if let Some(code) = *state.devices_failure.lock().unwrap() {
        return status_response(code, "device listing failure (stub)");
    }

    let page_number: usize = params
        .get("pageNumber")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1)
        .max(1);
    let devices = state.devices.lock().unwrap();
    let start = (page_number - 1) * state.page_size;
    let data: Vec<Value> = devices.iter().skip(start).take(state.page_size).cloned().collect();

    let mut links = json!({});
    if start + state.page_size < devices.len() {
        links["nextPage"] = json!(format!(
            "/api/devices?pageNumber={}&pageSize={}",
            page_number + 1,
            state.page_size
        ));
    }

    Json(json!({
        "data": data,
        "pageNumber": page_number,
        "pageSize": state.page_size,
        "totalItems": devices.len(),
        "_links": links,
    }))
    .into_response()
}

async fn service_status(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    state.counters.probes.fetch_add(1, Ordering::SeqCst);

    if bearer(&headers) != Some(ACCESS_TOKEN) {
        return status_response(401, "missing access token");
    }
    if let Some(code) = state.service_failures.lock().unwrap().get(&id).copied() {
        return status_response(code, "service status failure (stub)");
    }
    match state.services.lock().unwrap().get(&id) {
        Some(entries) => Json(json!({ "data": entries })).into_response(),
        None => status_response(404, "device not found"),
    }
}
