/**
 * SERVEUR HTTP WALLBOARD - Expose le snapshot et les assets du dashboard
 *
 * RÔLE :
 * Lecteur seul du snapshot publié par le harvester. Aucun état partagé avec le
 * pipeline en dehors du fichier (et du tracker pour /system/health).
 *
 * ROUTES :
 * - /health          : liveness du process
 * - /system/health   : état du harvester (cycles, dernière erreur, compteurs)
 * - /data.json       : dernier snapshot publié, relu à chaque requête
 * - (fallback)       : fichiers statiques du web root (index.html, js, css...)
 *
 * Toutes les réponses sont non-cachables et lisibles cross-origin.
 */

use axum::extract::State;
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::health::{HarvestHealth, HarvestTracker};
use crate::snapshot::SnapshotStore;

const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";

#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
    pub tracker: HarvestTracker,
}

pub fn build_router(app_state: AppState, web_root: impl Into<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/data.json", get(get_snapshot))
        .fallback_service(ServeDir::new(web_root.into()))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE)))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<HarvestHealth> {
    Json(app.tracker.get_health())
}

// GET /data.json (lecture du fichier à chaque requête, jamais de cache mémoire)
async fn get_snapshot(State(app): State<AppState>) -> Response {
    match app.store.read_raw().await {
        Ok(bytes) => ([(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            tracing::warn!(path = %app.store.path().display(), "snapshot unreadable: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "snapshot not available").into_response()
        }
    }
}
