use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{Router, routing::get, routing::post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use curator_core::clients::crypto::TokenCipher;
use curator_core::config::CuratorConfig;
use curator_core::handlers;
use curator_core::jobs::scheduler::spawn_scheduler_tick;
use curator_core::mirror::MirrorStore;
use curator_core::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("curator_core=debug,tower_http=debug")),
        )
        .init();

    let config_path = std::env::var("CURATOR_CONFIG").unwrap_or_else(|_| "./curator.toml".to_string());
    let config = CuratorConfig::load(&config_path)?;

    let mirror_path = std::env::var("CURATOR_MIRROR_DB").unwrap_or_else(|_| "./curator_mirror.db".to_string());
    let store = Arc::new(MirrorStore::open(&mirror_path)?);
    tracing::info!("mirror opened at {mirror_path}");

    let cipher = TokenCipher::from_env()?;
    let tick_secs = config.scheduler.tick_secs;

    let state = AppState::new(store.clone(), config, cipher);
    spawn_scheduler_tick(state.orchestrator.clone(), store, tick_secs);

    let webhook_body_cap = state.webhook.body_cap_bytes();

    let app = Router::new()
        .route("/sync/library", post(handlers::sync::start_library_sync))
        .route("/sync/library/cancel", post(handlers::sync::cancel_library_sync))
        .route("/sync/library/progress", get(handlers::sync::library_sync_progress))
        .route("/sync/library/stream", get(handlers::sync::library_sync_stream))
        .route("/sync/history", post(handlers::sync::start_history_sync))
        .route("/sync/history/cancel", post(handlers::sync::cancel_history_sync))
        .route("/sync/history/progress", get(handlers::sync::history_sync_progress))
        .route("/sync/history/stream", get(handlers::sync::history_sync_stream))
        .route("/candidates", get(handlers::candidates::preview_candidates))
        .route("/cascade", post(handlers::cascade::start_cascade))
        .route("/cascade/cancel", post(handlers::cascade::cancel_cascade))
        .route("/cascade/progress", get(handlers::cascade::cascade_progress))
        .route("/cascade/stream", get(handlers::cascade::cascade_stream))
        .route(
            "/webhook/{service}/{owner_id}",
            post(handlers::webhook::receive_webhook).layer(DefaultBodyLimit::max(webhook_body_cap)),
        )
        .route("/healthz", get(handlers::health::healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("curator-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
