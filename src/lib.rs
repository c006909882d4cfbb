pub mod cascade;
pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod mirror;
pub mod models;
pub mod scoring;
pub mod sync;
pub mod webhook;

use std::sync::Arc;

use clients::ClientFactory;
use clients::crypto::TokenCipher;
use config::CuratorConfig;
use jobs::{JobOrchestrator, JobRegistry};
use mirror::MirrorStore;
use webhook::WebhookDispatcher;

/// Shared state handed to every axum handler: the mirror, the orchestrator
/// that owns the job registry and integration clients, the webhook
/// dispatcher, and the resolved config (kept for read-only diagnostics).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MirrorStore>,
    pub orchestrator: JobOrchestrator,
    pub webhook: Arc<WebhookDispatcher>,
    pub config: Arc<CuratorConfig>,
}

impl AppState {
    pub fn new(store: Arc<MirrorStore>, config: CuratorConfig, cipher: TokenCipher) -> Self {
        let config = Arc::new(config);
        let clients = ClientFactory::new(&config.http);
        let cipher = Arc::new(cipher);
        let registry = Arc::new(JobRegistry::new());

        let orchestrator = JobOrchestrator {
            store: store.clone(),
            registry,
            clients,
            cipher,
            sync_config: config.sync.clone(),
            cascade_config: config.cascade.clone(),
        };

        let webhook = Arc::new(WebhookDispatcher::new(
            store.clone(),
            orchestrator.clone(),
            config.webhook.debounce_secs,
            config.webhook.body_cap_bytes,
        ));

        Self {
            store,
            orchestrator,
            webhook,
            config,
        }
    }
}
