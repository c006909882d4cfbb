use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{CuratorError, CuratorResult};
use crate::models::job::{JobKind, JobProgress};

struct ActiveJob {
    cancel: CancellationToken,
    progress_rx: watch::Receiver<JobProgress>,
}

/// Enforces per-owner job exclusion (spec.md §5): a `cascade_delete`
/// excludes every other job kind for that owner, but `library_sync` and
/// `history_sync` may run concurrently for the same owner. Keyed by
/// `(owner_id, kind)` rather than bare `owner_id` so two non-conflicting
/// kinds don't block each other.
#[derive(Default)]
pub struct JobRegistry {
    active: Mutex<HashMap<(String, JobKind), ActiveJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_start(
        &self,
        owner_id: &str,
        kind: JobKind,
        cancel: CancellationToken,
        progress_rx: watch::Receiver<JobProgress>,
    ) -> CuratorResult<()> {
        let mut active = self.active.lock().unwrap();

        let running_kinds: Vec<JobKind> = active
            .keys()
            .filter(|(owner, _)| owner == owner_id)
            .map(|(_, k)| *k)
            .collect();

        if running_kinds.contains(&JobKind::CascadeDelete) {
            return Err(CuratorError::Conflict(
                "a cascade_delete job is already running for this owner".into(),
            ));
        }
        if kind == JobKind::CascadeDelete && !running_kinds.is_empty() {
            return Err(CuratorError::Conflict(
                "cascade_delete cannot start while another job is running for this owner".into(),
            ));
        }
        if running_kinds.contains(&kind) {
            return Err(CuratorError::Conflict(format!(
                "a {} job is already running for this owner",
                kind.as_str()
            )));
        }

        active.insert((owner_id.to_string(), kind), ActiveJob { cancel, progress_rx });
        Ok(())
    }

    pub fn finish(&self, owner_id: &str, kind: JobKind) {
        self.active.lock().unwrap().remove(&(owner_id.to_string(), kind));
    }

    pub fn cancel(&self, owner_id: &str, kind: JobKind) -> CuratorResult<()> {
        let active = self.active.lock().unwrap();
        match active.get(&(owner_id.to_string(), kind)) {
            Some(job) => {
                job.cancel.cancel();
                Ok(())
            }
            None => Err(CuratorError::NotFound(format!(
                "no active {} job for this owner",
                kind.as_str()
            ))),
        }
    }

    pub fn progress(&self, owner_id: &str, kind: JobKind) -> CuratorResult<JobProgress> {
        let active = self.active.lock().unwrap();
        match active.get(&(owner_id.to_string(), kind)) {
            Some(job) => Ok(job.progress_rx.borrow().clone()),
            None => Err(CuratorError::NotFound(format!(
                "no active {} job for this owner",
                kind.as_str()
            ))),
        }
    }

    pub fn subscribe(&self, owner_id: &str, kind: JobKind) -> CuratorResult<watch::Receiver<JobProgress>> {
        let active = self.active.lock().unwrap();
        match active.get(&(owner_id.to_string(), kind)) {
            Some(job) => Ok(job.progress_rx.clone()),
            None => Err(CuratorError::NotFound(format!(
                "no active {} job for this owner",
                kind.as_str()
            ))),
        }
    }

    pub fn is_active(&self, owner_id: &str) -> bool {
        self.active
            .lock()
            .unwrap()
            .keys()
            .any(|(owner, _)| owner == owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{CascadeProgress, SyncProgress};

    #[test]
    fn cascade_excludes_everything_for_the_owner() {
        let registry = JobRegistry::new();
        let (_tx, rx) = watch::channel(JobProgress::Sync(SyncProgress::default()));
        registry
            .try_start("owner1", JobKind::LibrarySync, CancellationToken::new(), rx.clone())
            .unwrap();
        let result = registry.try_start("owner1", JobKind::CascadeDelete, CancellationToken::new(), rx.clone());
        assert!(matches!(result, Err(CuratorError::Conflict(_))));

        registry.finish("owner1", JobKind::LibrarySync);
        registry
            .try_start("owner1", JobKind::CascadeDelete, CancellationToken::new(), rx.clone())
            .unwrap();
        let result = registry.try_start("owner1", JobKind::LibrarySync, CancellationToken::new(), rx);
        assert!(matches!(result, Err(CuratorError::Conflict(_))));
    }

    #[test]
    fn library_and_history_sync_run_concurrently() {
        let registry = JobRegistry::new();
        let (_tx1, rx1) = watch::channel(JobProgress::Sync(SyncProgress::default()));
        let (_tx2, rx2) = watch::channel(JobProgress::Cascade(CascadeProgress::default()));
        registry
            .try_start("owner1", JobKind::LibrarySync, CancellationToken::new(), rx1)
            .unwrap();
        registry
            .try_start("owner1", JobKind::HistorySync, CancellationToken::new(), rx2)
            .unwrap();
    }

    #[test]
    fn finish_frees_only_its_own_kind() {
        let registry = JobRegistry::new();
        let (_tx, rx) = watch::channel(JobProgress::Sync(SyncProgress::default()));
        registry
            .try_start("owner1", JobKind::LibrarySync, CancellationToken::new(), rx.clone())
            .unwrap();
        registry.finish("owner1", JobKind::LibrarySync);
        assert!(registry.try_start("owner1", JobKind::LibrarySync, CancellationToken::new(), rx).is_ok());
    }
}
