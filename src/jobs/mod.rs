pub mod cancel;
pub mod progress;
pub mod registry;
pub mod scheduler;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cascade::CascadeExecutor;
use crate::clients::ClientFactory;
use crate::clients::crypto::TokenCipher;
use crate::config::{CascadeConfig, SyncConfig};
use crate::error::{CuratorError, CuratorResult};
use crate::mirror::MirrorStore;
use crate::models::deletion_rule::{Candidate, CandidatePreview};
use crate::models::job::{CascadeProgress, JobKind, JobProgress, SyncProgress};
use crate::models::sync_event::SyncEvent;
use crate::scoring::{PreviewOptions, Scorer};
use crate::sync::history::HistorySync;
use crate::sync::library::LibrarySync;

pub use registry::JobRegistry;

/// Ties MirrorStore, IntegrationClients, scoring, sync, and cascade together
/// behind the per-(owner, kind) exclusion rule (spec.md §5). Owns no
/// long-lived tokio tasks itself — `start_*` spawns one and returns
/// immediately, leaving progress observable through the registry.
#[derive(Clone)]
pub struct JobOrchestrator {
    pub store: Arc<MirrorStore>,
    pub registry: Arc<JobRegistry>,
    pub clients: ClientFactory,
    pub cipher: Arc<TokenCipher>,
    pub sync_config: SyncConfig,
    pub cascade_config: CascadeConfig,
}

impl JobOrchestrator {
    fn server_for_owner(&self, owner_id: &str) -> CuratorResult<crate::models::server::Server> {
        self.store
            .list_servers_for_owner(owner_id)?
            .into_iter()
            .next()
            .ok_or_else(|| CuratorError::NotFound(format!("no server registered for owner {owner_id}")))
    }

    pub fn start_library_sync(&self, owner_id: &str) -> CuratorResult<()> {
        let server = self.server_for_owner(owner_id)?;
        if server.preferred_connection_url.is_none() {
            return Err(CuratorError::Validation(
                "server has no cached connection URL; probe it first".into(),
            ));
        }
        let ms_client = self.clients.ms_client(&server, &self.cipher)?;
        let tdl_integration = self.store.get_active_integration(owner_id, &server.id, "tdl")?;
        let mdl_integration = self.store.get_active_integration(owner_id, &server.id, "mdl")?;
        let tdl_client = tdl_integration.as_ref().map(|i| self.clients.tdl_client(i, &self.cipher)).transpose()?;
        let mdl_client = mdl_integration.as_ref().map(|i| self.clients.mdl_client(i, &self.cipher)).transpose()?;

        let (progress_tx, progress_rx) = watch::channel(JobProgress::Sync(SyncProgress::default()));
        let cancel = CancellationToken::new();
        self.registry
            .try_start(owner_id, JobKind::LibrarySync, cancel.clone(), progress_rx)?;

        let store = self.store.clone();
        let registry = self.registry.clone();
        let sync_config = self.sync_config.clone();
        let owner_id = owner_id.to_string();
        let server_id = server.id.clone();

        tokio::spawn(async move {
            let event = SyncEvent {
                id: Uuid::new_v4().to_string(),
                owner_id: owner_id.clone(),
                kind: "library_sync".into(),
                trigger: "manual".into(),
                items_created: 0,
                items_updated: 0,
                items_failed: 0,
                status: "running".into(),
                error_message: None,
                started_at: Utc::now().to_rfc3339(),
                finished_at: None,
            };
            if let Err(e) = store.create_sync_event(&event) {
                tracing::error!(error = %e, "failed to record sync_event start");
            }

            let sync = LibrarySync::new(&store, &ms_client, tdl_client.as_ref(), mdl_client.as_ref(), &sync_config);
            let result = sync.run(&owner_id, &server_id, &progress_tx, &cancel).await;

            match result {
                Ok(final_state) => {
                    let _ = store.finish_sync_event(
                        &event.id,
                        &final_state.status,
                        final_state.created as i64,
                        final_state.updated as i64,
                        final_state.failed as i64,
                        final_state.error_message.as_deref(),
                    );
                    if final_state.status == "completed" {
                        let _ = store.update_server_last_full_sync(&server_id, &Utc::now().to_rfc3339());
                    }
                }
                Err(e) => {
                    tracing::error!(owner_id, error = %e, "library sync failed");
                    let _ = store.finish_sync_event(&event.id, "failed", 0, 0, 0, Some(&e.to_string()));
                }
            }
            registry.finish(&owner_id, JobKind::LibrarySync);
        });

        Ok(())
    }

    pub fn start_history_sync(&self, owner_id: &str) -> CuratorResult<()> {
        let server = self.server_for_owner(owner_id)?;
        if server.preferred_connection_url.is_none() {
            return Err(CuratorError::Validation(
                "server has no cached connection URL; probe it first".into(),
            ));
        }
        let ms_client = self.clients.ms_client(&server, &self.cipher)?;
        let ahs_integration = self
            .store
            .get_active_integration(owner_id, &server.id, "ahs")?;
        let ahs_client = ahs_integration
            .as_ref()
            .map(|i| self.clients.ahs_client(i, &self.cipher))
            .transpose()?;

        let (progress_tx, progress_rx) = watch::channel(JobProgress::Sync(SyncProgress::default()));
        let cancel = CancellationToken::new();
        self.registry
            .try_start(owner_id, JobKind::HistorySync, cancel.clone(), progress_rx)?;

        let store = self.store.clone();
        let registry = self.registry.clone();
        let owner_id = owner_id.to_string();
        let server_id = server.id.clone();

        tokio::spawn(async move {
            let event = SyncEvent {
                id: Uuid::new_v4().to_string(),
                owner_id: owner_id.clone(),
                kind: "history_sync".into(),
                trigger: "manual".into(),
                items_created: 0,
                items_updated: 0,
                items_failed: 0,
                status: "running".into(),
                error_message: None,
                started_at: Utc::now().to_rfc3339(),
                finished_at: None,
            };
            if let Err(e) = store.create_sync_event(&event) {
                tracing::error!(error = %e, "failed to record sync_event start");
            }

            let sync = HistorySync::new(&store, &ms_client, ahs_client.as_ref());
            let result = sync.run(&owner_id, &server_id, &progress_tx, &cancel).await;
            match result {
                Ok(final_state) => {
                    let _ = store.finish_sync_event(
                        &event.id,
                        &final_state.status,
                        final_state.created as i64,
                        final_state.updated as i64,
                        final_state.failed as i64,
                        final_state.error_message.as_deref(),
                    );
                }
                Err(e) => {
                    tracing::error!(owner_id, error = %e, "history sync failed");
                    let _ = store.finish_sync_event(&event.id, "failed", 0, 0, 0, Some(&e.to_string()));
                }
            }
            registry.finish(&owner_id, JobKind::HistorySync);
        });

        Ok(())
    }

    pub fn preview_candidates(
        &self,
        owner_id: &str,
        rule_id: &str,
        opts: &PreviewOptions,
    ) -> CuratorResult<CandidatePreview> {
        let rule = self
            .store
            .get_rule(owner_id, rule_id)?
            .ok_or_else(|| CuratorError::NotFound(format!("no rule {rule_id}")))?;
        let scorer = Scorer::new(&self.store, &self.cascade_config);
        scorer.preview(owner_id, &rule, opts)
    }

    /// Expands the admin-confirmed `candidate_ids` into real `Candidate`
    /// rows, re-validating ownership against the mirror rather than
    /// trusting the client's view (spec.md §4.6). A `show:{title}` id
    /// expands into every episode of that show, each marked
    /// `show_origin: true` so the executor applies the show-level TDL
    /// policy instead of touching single episodes.
    fn resolve_candidates(&self, owner_id: &str, candidate_ids: &[String]) -> CuratorResult<Vec<Candidate>> {
        let now = Utc::now();
        let mut candidates = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            if let Some(show_title) = id.strip_prefix("show:") {
                let aggregate = self
                    .store
                    .show_aggregates(owner_id)?
                    .into_iter()
                    .find(|a| a.grandparent_title == show_title)
                    .ok_or_else(|| CuratorError::NotFound(format!("no show aggregate for '{show_title}'")))?;
                for episode_id in &aggregate.episode_media_item_ids {
                    let mut candidate = self
                        .store
                        .candidate_for_media_item(owner_id, episode_id, now)?
                        .ok_or_else(|| {
                            CuratorError::NotFound(format!(
                                "candidate {episode_id} not found or not owned by {owner_id}"
                            ))
                        })?;
                    candidate.show_origin = true;
                    candidates.push(candidate);
                }
            } else {
                let candidate = self
                    .store
                    .candidate_for_media_item(owner_id, id, now)?
                    .ok_or_else(|| {
                        CuratorError::NotFound(format!("candidate {id} not found or not owned by {owner_id}"))
                    })?;
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn start_cascade(
        &self,
        owner_id: &str,
        rule_id: &str,
        candidate_ids: &[String],
        dry_run: bool,
        force: bool,
        confirm_token: Option<&str>,
        actor: &str,
    ) -> CuratorResult<()> {
        let rule = self
            .store
            .get_rule(owner_id, rule_id)?
            .ok_or_else(|| CuratorError::NotFound(format!("no rule {rule_id}")))?;
        let server = self.server_for_owner(owner_id)?;
        if server.preferred_connection_url.is_none() {
            return Err(CuratorError::Validation(
                "server has no cached connection URL; probe it first".into(),
            ));
        }
        if candidate_ids.is_empty() {
            return Err(CuratorError::Validation("candidate_ids must not be empty".into()));
        }

        let candidates = self.resolve_candidates(owner_id, candidate_ids)?;

        if !dry_run {
            let expected = crate::scoring::compute_confirm_token(owner_id, rule_id, candidate_ids);
            match confirm_token {
                Some(token) if token == expected => {}
                _ => {
                    return Err(CuratorError::Safety(
                        "confirm_token missing or doesn't match the candidate set just previewed".into(),
                    ));
                }
            }
        }

        let total_catalog_size = self.store.catalog_size(owner_id)?;
        let safety_bound = if total_catalog_size == 0 {
            0
        } else {
            ((total_catalog_size as f64) * self.cascade_config.safety_percent_of_total / 100.0).floor() as usize
        };
        if !force && safety_bound > 0 && candidates.len() > safety_bound {
            return Err(CuratorError::Safety(format!(
                "{} candidates exceed {}% of the catalog; pass force=true to proceed",
                candidates.len(),
                self.cascade_config.safety_percent_of_total
            )));
        }

        let ms_client = self.clients.ms_client(&server, &self.cipher)?;
        let tdl_integration = self.store.get_active_integration(owner_id, &server.id, "tdl")?;
        let mdl_integration = self.store.get_active_integration(owner_id, &server.id, "mdl")?;
        let rqp_integration = self.store.get_active_integration(owner_id, &server.id, "rqp")?;
        let tdl_client = tdl_integration.as_ref().map(|i| self.clients.tdl_client(i, &self.cipher)).transpose()?;
        let mdl_client = mdl_integration.as_ref().map(|i| self.clients.mdl_client(i, &self.cipher)).transpose()?;
        let rqp_client = rqp_integration.as_ref().map(|i| self.clients.rqp_client(i, &self.cipher)).transpose()?;

        let (progress_tx, progress_rx) = watch::channel(JobProgress::Cascade(CascadeProgress::default()));
        let cancel = CancellationToken::new();
        self.registry
            .try_start(owner_id, JobKind::CascadeDelete, cancel.clone(), progress_rx)?;

        let store = self.store.clone();
        let registry = self.registry.clone();
        let cascade_config = self.cascade_config.clone();
        let owner_id_owned = owner_id.to_string();
        let rule_id_owned = rule_id.to_string();
        let actor = actor.to_string();

        tokio::spawn(async move {
            let executor = CascadeExecutor::new(
                &store,
                &ms_client,
                tdl_client.as_ref(),
                mdl_client.as_ref(),
                rqp_client.as_ref(),
                &cascade_config,
            );
            let result = executor
                .run(
                    &owner_id_owned,
                    Some(&rule_id_owned),
                    candidates,
                    dry_run,
                    &actor,
                    &progress_tx,
                    &cancel,
                )
                .await;
            if let Err(e) = result {
                tracing::error!(owner_id = %owner_id_owned, error = %e, "cascade failed");
            }
            let _ = store.touch_rule_last_run(&rule_id_owned);
            registry.finish(&owner_id_owned, JobKind::CascadeDelete);
        });

        Ok(())
    }

    pub fn cancel(&self, owner_id: &str, kind: JobKind) -> CuratorResult<()> {
        self.registry.cancel(owner_id, kind)
    }

    pub fn progress(&self, owner_id: &str, kind: JobKind) -> CuratorResult<JobProgress> {
        self.registry.progress(owner_id, kind)
    }

    pub fn subscribe(&self, owner_id: &str, kind: JobKind) -> CuratorResult<watch::Receiver<JobProgress>> {
        self.registry.subscribe(owner_id, kind)
    }
}
