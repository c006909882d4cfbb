use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::clients::mdl::MdlClient;
use crate::clients::ms::MediaServerClient;
use crate::clients::tdl::TdlClient;
use crate::config::SyncConfig;
use crate::error::{CuratorError, CuratorResult};
use crate::mirror::MirrorStore;
use crate::models::job::{JobProgress, SyncProgress};

use super::throughput::ThroughputWindow;

const CHUNK_RETRY_DELAYS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(4)];

/// Full-catalog crawl of every library section on a Server, upserted into
/// the mirror in transactional batches (spec.md §4.3). Sections are listed
/// `max_parallel_sections` at a time — the mirror write itself stays
/// serialized through `MirrorStore`'s connection mutex, so the parallelism
/// only buys back the network round-trip to MS, not write throughput.
pub struct LibrarySync<'a> {
    store: &'a MirrorStore,
    ms: &'a MediaServerClient,
    tdl: Option<&'a TdlClient>,
    mdl: Option<&'a MdlClient>,
    config: &'a SyncConfig,
}

impl<'a> LibrarySync<'a> {
    pub fn new(
        store: &'a MirrorStore,
        ms: &'a MediaServerClient,
        tdl: Option<&'a TdlClient>,
        mdl: Option<&'a MdlClient>,
        config: &'a SyncConfig,
    ) -> Self {
        Self { store, ms, tdl, mdl, config }
    }

    pub async fn run(
        &self,
        owner_id: &str,
        server_id: &str,
        progress: &watch::Sender<JobProgress>,
        cancel: &CancellationToken,
    ) -> CuratorResult<SyncProgress> {
        let mut window = ThroughputWindow::new(Duration::from_secs(
            self.config.throughput_window_secs.max(1) as u64,
        ));
        let mut state = SyncProgress {
            status: "running".into(),
            ..Default::default()
        };

        let sections = self.ms.list_sections().await?;
        let mut per_section = Vec::with_capacity(sections.len());
        for group in sections.chunks(self.config.max_parallel_sections.max(1)) {
            if cancel.is_cancelled() {
                state.status = "cancelled".into();
                let _ = progress.send(JobProgress::Sync(state.clone()));
                return Ok(state);
            }
            let futures = group.iter().map(|section| async move {
                let items = self.ms.list_items(&section.id).await;
                (section.title.clone(), items)
            });
            for (title, items_result) in futures_util::future::join_all(futures).await {
                match items_result {
                    Ok(items) => {
                        state.total += items.len() as u64;
                        per_section.push((title, items));
                    }
                    Err(e) => {
                        tracing::error!(section = %title, error = %e, "failed to list section items");
                        state.warning = Some(format!("section '{title}' could not be listed: {e}"));
                    }
                }
            }
        }
        let _ = progress.send(JobProgress::Sync(state.clone()));

        'sections: for (section_title, items) in per_section {
            state.section = Some(section_title.clone());
            let mut tdl_cache: HashMap<String, Option<String>> = HashMap::new();
            let mut mdl_cache: HashMap<String, Option<String>> = HashMap::new();
            let mut chunk = Vec::with_capacity(self.config.batch_size);
            for item in items {
                if cancel.is_cancelled() {
                    state.status = "cancelled".into();
                    let _ = progress.send(JobProgress::Sync(state.clone()));
                    break 'sections;
                }
                state.title = Some(item.title.clone());
                let external_id = item.external_id.clone();

                let tdl_series_id = match (self.tdl, item.tvdb_id.as_deref()) {
                    (Some(tdl), Some(tvdb_id)) => {
                        self.resolve_cached(&mut tdl_cache, tvdb_id, |id| tdl.resolve_by_tvdb_id(id)).await
                    }
                    _ => None,
                };
                let mdl_movie_id = match (self.mdl, item.tmdb_id.as_deref()) {
                    (Some(mdl), Some(tmdb_id)) => {
                        self.resolve_cached(&mut mdl_cache, tmdb_id, |id| mdl.resolve_by_tmdb_id(id)).await
                    }
                    _ => None,
                };

                chunk.push((external_id, item.into_patch(&section_title, tdl_series_id, mdl_movie_id)));
                if chunk.len() >= self.config.batch_size {
                    self.flush_chunk(owner_id, server_id, &mut chunk, &mut state, &mut window, progress)
                        .await;
                }
            }
            if !chunk.is_empty() {
                self.flush_chunk(owner_id, server_id, &mut chunk, &mut state, &mut window, progress)
                    .await;
            }
        }

        if state.status == "running" {
            state.status = "completed".into();
        }
        let _ = progress.send(JobProgress::Sync(state.clone()));
        Ok(state)
    }

    /// One lookup per distinct external id per section, not per episode —
    /// a twelve-episode season would otherwise repeat the same TDL lookup
    /// twelve times.
    async fn resolve_cached<F, Fut>(
        &self,
        cache: &mut HashMap<String, Option<String>>,
        key: &str,
        lookup: F,
    ) -> Option<String>
    where
        F: FnOnce(&str) -> Fut,
        Fut: std::future::Future<Output = CuratorResult<Option<String>>>,
    {
        if let Some(cached) = cache.get(key) {
            return cached.clone();
        }
        let resolved = match lookup(key).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(key, error = %e, "companion id lookup failed");
                None
            }
        };
        cache.insert(key.to_string(), resolved.clone());
        resolved
    }

    async fn flush_chunk(
        &self,
        owner_id: &str,
        server_id: &str,
        chunk: &mut Vec<(String, crate::models::media_item::MediaItemPatch)>,
        state: &mut SyncProgress,
        window: &mut ThroughputWindow,
        progress: &watch::Sender<JobProgress>,
    ) {
        let mut attempt_result = self.store.batch_upsert_chunk(owner_id, server_id, chunk);
        let mut attempts = 0;
        while let Err(CuratorError::Database(_)) = &attempt_result {
            if attempts >= CHUNK_RETRY_DELAYS.len() {
                break;
            }
            tokio::time::sleep(CHUNK_RETRY_DELAYS[attempts]).await;
            attempts += 1;
            attempt_result = self.store.batch_upsert_chunk(owner_id, server_id, chunk);
        }

        match attempt_result {
            Ok(outcome) => {
                state.created += outcome.created as u64;
                state.updated += outcome.updated as u64;
                state.failed += outcome.failed as u64;
                if outcome.failed > 0 {
                    state.warning = Some(format!(
                        "{} item(s) in this batch failed validation: {}",
                        outcome.failed,
                        outcome.failures.join("; ")
                    ));
                }
            }
            Err(e) => {
                state.failed += chunk.len() as u64;
                state.warning = Some(format!("batch of {} items failed: {e}", chunk.len()));
            }
        }

        state.current += chunk.len() as u64;
        window.record(state.current);
        state.items_per_second = window.items_per_second();
        state.eta_seconds = window.eta_seconds(state.total.saturating_sub(state.current));
        let _ = progress.send(JobProgress::Sync(state.clone()));
        chunk.clear();
    }
}
