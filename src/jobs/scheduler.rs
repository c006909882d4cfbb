use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::CuratorError;
use crate::mirror::MirrorStore;
use crate::models::job::JobKind;

use super::JobOrchestrator;

/// Scans `job_schedules` for due (owner, kind) pairs on a fixed tick and
/// dispatches them through the orchestrator (spec.md §4.7). Spawned the same
/// way the teacher spawns its background engines from `main.rs` — one task,
/// for the process's lifetime.
pub fn spawn_scheduler_tick(
    orchestrator: JobOrchestrator,
    store: Arc<MirrorStore>,
    tick_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_secs.max(1)));
        loop {
            interval.tick().await;
            let due = match store.get_due_schedules(Utc::now()) {
                Ok(due) => due,
                Err(e) => {
                    tracing::error!(error = %e, "scheduler tick failed to load due schedules");
                    continue;
                }
            };
            if due.is_empty() {
                continue;
            }
            tracing::info!(count = due.len(), "scheduler tick dispatching due jobs");

            for schedule in due {
                let Some(kind) = JobKind::from_str(&schedule.kind) else {
                    tracing::warn!(kind = schedule.kind, "unknown job kind in schedule, skipping");
                    continue;
                };
                let dispatch = match kind {
                    JobKind::LibrarySync => orchestrator.start_library_sync(&schedule.owner_id),
                    JobKind::HistorySync => orchestrator.start_history_sync(&schedule.owner_id),
                    JobKind::CascadeDelete => {
                        tracing::warn!(
                            owner_id = schedule.owner_id,
                            "cascade_delete is not scheduler-eligible, skipping"
                        );
                        continue;
                    }
                };
                match dispatch {
                    Ok(()) => {
                        let _ = store.record_schedule_run(
                            &schedule.owner_id,
                            &schedule.kind,
                            "started",
                            None,
                            schedule.interval_hours,
                        );
                    }
                    Err(CuratorError::Conflict(_)) => {
                        tracing::info!(
                            owner_id = schedule.owner_id,
                            "skipping scheduled job, another job already running for this owner"
                        );
                    }
                    Err(e) => {
                        tracing::error!(owner_id = schedule.owner_id, error = %e, "failed to start scheduled job");
                        let _ = store.record_schedule_run(
                            &schedule.owner_id,
                            &schedule.kind,
                            "failed",
                            Some(&e.to_string()),
                            schedule.interval_hours,
                        );
                    }
                }
            }
        }
    })
}
