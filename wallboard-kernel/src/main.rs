/**
 * WALLBOARD KERNEL - Point d'entrée du harvester et du serveur dashboard
 *
 * RÔLE : Bootstrap : config, snapshot initial, boucle de harvest, serveur HTTP.
 * Le harvester (seul écrivain) et le serveur HTTP (lecteurs) ne partagent que le
 * fichier snapshot, publié atomiquement.
 *
 * UTILITÉ : Wallboard des serveurs clients supervisés par N-central, classés par gravité.
 */

mod aggregate;
mod config;
mod error;
mod harvest;
mod health;
mod http;
mod liveness;
mod models;
mod nable;
mod probe;
mod snapshot;

use crate::config::{load_config, WallboardConfig};
use crate::health::HarvestTracker;
use crate::http::AppState;
use crate::snapshot::SnapshotStore;

use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wallboard_kernel=info,tower_http=info")),
        )
        .init();

    let cfg: WallboardConfig = load_config().await;
    tracing::info!(
        base_url = %cfg.nable.base_url,
        threshold_mins = cfg.harvest.threshold_mins,
        cycle_secs = cfg.harvest.cycle_secs,
        "wallboard kernel starting"
    );

    // le snapshot doit exister avant que le serveur ne réponde
    let store = SnapshotStore::new(&cfg.web.data_file);
    store
        .ensure_exists()
        .await
        .with_context(|| format!("cannot initialise snapshot at {}", cfg.web.data_file))?;

    let tracker = HarvestTracker::new();

    // harvest en tâche de fond ; sans NABLE_TOKEN seul le serveur tourne
    harvest::spawn_harvest_loop(cfg.clone(), store.clone(), tracker.clone());

    let app = http::build_router(AppState { store, tracker }, &cfg.web.web_root);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.web.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!("listening on http://{addr}");
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
