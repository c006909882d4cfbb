use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use curator_core::AppState;
use curator_core::clients::crypto::TokenCipher;
use curator_core::config::CuratorConfig;
use curator_core::jobs::scheduler::spawn_scheduler_tick;
use curator_core::mirror::MirrorStore;

/// Standalone scheduler process: runs the same tick loop `curator-api` runs
/// in-process, for deployments that want schedule dispatch isolated from
/// the HTTP surface. Shares the mirror and config with the API process.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("curator_core=debug")),
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

    tracing::info!(tick_secs, "curator-scheduler starting dispatch loop");
    spawn_scheduler_tick(state.orchestrator, store, tick_secs)
        .await
        .map_err(anyhow::Error::from)
}
