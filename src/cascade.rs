use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::clients::mdl::MdlClient;
use crate::clients::ms::MediaServerClient;
use crate::clients::rqp::RqpClient;
use crate::clients::tdl::TdlClient;
use crate::config::CascadeConfig;
use crate::error::CuratorResult;
use crate::mirror::MirrorStore;
use crate::models::deletion_event::DeletionEvent;
use crate::models::deletion_rule::Candidate;
use crate::models::job::{CascadeProgress, JobProgress};

fn now_str() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

struct CandidateOutcome {
    bytes_freed: i64,
    failed: bool,
}

/// Runs the five-step deletion sequence per candidate (spec.md §4.6):
/// MS delete, companion unmonitor+delete (TDL or MDL, whichever applies),
/// RQP request cleanup, audit write, mirror row removal. Steps after MS
/// delete are best-effort — their failure doesn't undo the MS delete, but
/// it does downgrade the candidate's own status to "partial" and is
/// recorded on the audit row, not just logged.
pub struct CascadeExecutor<'a> {
    store: &'a MirrorStore,
    ms: &'a MediaServerClient,
    tdl: Option<&'a TdlClient>,
    mdl: Option<&'a MdlClient>,
    rqp: Option<&'a RqpClient>,
    config: &'a CascadeConfig,
}

impl<'a> CascadeExecutor<'a> {
    pub fn new(
        store: &'a MirrorStore,
        ms: &'a MediaServerClient,
        tdl: Option<&'a TdlClient>,
        mdl: Option<&'a MdlClient>,
        rqp: Option<&'a RqpClient>,
        config: &'a CascadeConfig,
    ) -> Self {
        Self {
            store,
            ms,
            tdl,
            mdl,
            rqp,
            config,
        }
    }

    pub async fn run(
        &self,
        owner_id: &str,
        rule_id: Option<&str>,
        candidates: Vec<Candidate>,
        dry_run: bool,
        actor: &str,
        progress: &watch::Sender<JobProgress>,
        cancel: &CancellationToken,
    ) -> CuratorResult<CascadeProgress> {
        let mut state = CascadeProgress {
            status: "running".into(),
            total: candidates.len() as u64,
            ..Default::default()
        };
        let _ = progress.send(JobProgress::Cascade(state.clone()));

        for group in candidates.chunks(self.config.concurrency_per_owner.max(1)) {
            if cancel.is_cancelled() {
                state.status = "cancelled".into();
                let _ = progress.send(JobProgress::Cascade(state.clone()));
                return Ok(state);
            }

            let futures = group
                .iter()
                .map(|c| self.process_one(owner_id, rule_id, c, dry_run, actor));
            let results = futures_util::future::join_all(futures).await;

            for (candidate, result) in group.iter().zip(results) {
                state.current += 1;
                match result {
                    Ok(outcome) if outcome.failed => {
                        state.failed += 1;
                    }
                    Ok(outcome) => {
                        state.deleted += 1;
                        state.bytes_freed += outcome.bytes_freed;
                    }
                    Err(e) => {
                        state.failed += 1;
                        state.error_message = Some(format!("{}: {e}", candidate.title));
                    }
                }
                state.current_item = Some(candidate.title.clone());
                let _ = progress.send(JobProgress::Cascade(state.clone()));
            }

            tokio::time::sleep(Duration::from_millis(self.config.inter_candidate_delay_ms)).await;
        }

        state.status = if state.failed > 0 && state.deleted > 0 {
            "partial".into()
        } else if state.failed > 0 {
            "failed".into()
        } else {
            "completed".into()
        };
        let _ = progress.send(JobProgress::Cascade(state.clone()));
        Ok(state)
    }

    async fn process_one(
        &self,
        owner_id: &str,
        rule_id: Option<&str>,
        candidate: &Candidate,
        dry_run: bool,
        actor: &str,
    ) -> CuratorResult<CandidateOutcome> {
        if dry_run {
            return Ok(CandidateOutcome {
                bytes_freed: candidate.file_size_bytes,
                failed: false,
            });
        }

        let ms_result = self.ms.delete_item(&candidate.media_item_id).await;
        let ms_deleted = match ms_result {
            Ok(ok) => ok,
            Err(e) => {
                // MS delete is the one step that isn't best-effort: if it
                // fails the file is still there, so the row must stay in
                // the mirror. Write the audit row directly rather than
                // through `hard_delete`, which would remove it.
                let event = DeletionEvent {
                    id: uuid::Uuid::new_v4().to_string(),
                    owner_id: owner_id.to_string(),
                    rule_id: rule_id.map(str::to_string),
                    media_item_id: candidate.media_item_id.clone(),
                    title: candidate.title.clone(),
                    kind: candidate.kind.clone(),
                    file_size_bytes: candidate.file_size_bytes,
                    file_path: None,
                    reason: "matched deletion rule".into(),
                    score: 0.0,
                    deleted_from_ms: false,
                    deleted_from_ms_at: None,
                    deleted_from_tdl: false,
                    deleted_from_tdl_at: None,
                    deleted_from_mdl: false,
                    deleted_from_mdl_at: None,
                    deleted_from_rqp: false,
                    deleted_from_rqp_at: None,
                    dry_run: false,
                    status: "failed".into(),
                    actor: actor.to_string(),
                    deleted_at: now_str(),
                    error_message: Some(e.to_string()),
                };
                self.store.create_deletion_event(&event)?;
                return Ok(CandidateOutcome {
                    bytes_freed: 0,
                    failed: true,
                });
            }
        };
        let ms_at = now_str();

        let mut step_errors = Vec::new();

        // TDL is only ever touched for a show-level-originated deletion —
        // a single episode deletion never unmonitors or deletes the whole
        // series (spec.md §4.6).
        let (tdl_deleted, tdl_at) = if candidate.show_origin {
            if let (Some(tdl), Some(series_id)) = (self.tdl, candidate.tdl_series_id.as_deref()) {
                match self.delete_from_tdl(tdl, series_id).await {
                    Ok(ok) => (ok, Some(now_str())),
                    Err(e) => {
                        step_errors.push(format!("tdl: {e}"));
                        (false, None)
                    }
                }
            } else {
                (false, None)
            }
        } else {
            (false, None)
        };

        let (mdl_deleted, mdl_at) = if let (Some(mdl), Some(movie_id)) =
            (self.mdl, candidate.mdl_movie_id.as_deref())
        {
            match self.delete_from_mdl(mdl, movie_id).await {
                Ok(ok) => (ok, Some(now_str())),
                Err(e) => {
                    step_errors.push(format!("mdl: {e}"));
                    (false, None)
                }
            }
        } else {
            (false, None)
        };

        let (rqp_cleared, rqp_at) = if let Some(rqp) = self.rqp {
            let request_ref = candidate.tmdb_id.as_deref().unwrap_or(&candidate.media_item_id);
            match rqp.clear_request_for(request_ref).await {
                Ok(ok) => (ok, Some(now_str())),
                Err(e) => {
                    step_errors.push(format!("rqp: {e}"));
                    (false, None)
                }
            }
        } else {
            (false, None)
        };

        let status = if step_errors.is_empty() { "completed" } else { "partial" };
        let error_message = if step_errors.is_empty() {
            None
        } else {
            Some(step_errors.join("; "))
        };

        let event = DeletionEvent {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            rule_id: rule_id.map(str::to_string),
            media_item_id: candidate.media_item_id.clone(),
            title: candidate.title.clone(),
            kind: candidate.kind.clone(),
            file_size_bytes: candidate.file_size_bytes,
            file_path: None,
            reason: "matched deletion rule".into(),
            score: 0.0,
            deleted_from_ms: ms_deleted,
            deleted_from_ms_at: Some(ms_at),
            deleted_from_tdl: tdl_deleted,
            deleted_from_tdl_at: tdl_at,
            deleted_from_mdl: mdl_deleted,
            deleted_from_mdl_at: mdl_at,
            deleted_from_rqp: rqp_cleared,
            deleted_from_rqp_at: rqp_at,
            dry_run: false,
            status: status.into(),
            actor: actor.to_string(),
            deleted_at: now_str(),
            error_message,
        };

        self.store.hard_delete(&candidate.media_item_id, &event)?;
        Ok(CandidateOutcome {
            bytes_freed: candidate.file_size_bytes,
            failed: false,
        })
    }

    /// `deleteFiles=false` + `addImportListExclusion=true`: a show-level
    /// deletion still wants TDL to keep its own file bookkeeping in sync,
    /// but MS already removed the files, and the series must not be
    /// re-added by a monitored import list (spec.md §4.6).
    async fn delete_from_tdl(&self, tdl: &TdlClient, series_id: &str) -> CuratorResult<bool> {
        tdl.unmonitor(series_id).await?;
        tdl.delete_series(series_id, false, true).await
    }

    async fn delete_from_mdl(&self, mdl: &MdlClient, movie_id: &str) -> CuratorResult<bool> {
        mdl.unmonitor(movie_id).await?;
        mdl.delete_movie(movie_id, true).await
    }
}
