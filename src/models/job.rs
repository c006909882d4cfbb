use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    LibrarySync,
    HistorySync,
    CascadeDelete,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::LibrarySync => "library_sync",
            JobKind::HistorySync => "history_sync",
            JobKind::CascadeDelete => "cascade_delete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "library_sync" => Some(JobKind::LibrarySync),
            "history_sync" => Some(JobKind::HistorySync),
            "cascade_delete" => Some(JobKind::CascadeDelete),
            _ => None,
        }
    }
}

/// Terminal states a job can end in (spec.md §6). `Partial` only applies to
/// cascades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Partial,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Partial => "partial",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Progress frame for LibrarySync / HistorySync (§4.3, §4.4). Fields that
/// don't apply to a given job kind are left at their default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    pub status: String,
    pub current: u64,
    pub total: u64,
    pub section: Option<String>,
    pub title: Option<String>,
    pub items_per_second: f64,
    pub eta_seconds: Option<f64>,
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    pub history_source: Option<String>,
    pub warning: Option<String>,
    pub error_message: Option<String>,
}

/// Progress frame for CascadeExecutor (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeProgress {
    pub status: String,
    pub current: u64,
    pub total: u64,
    pub deleted: u64,
    pub failed: u64,
    pub current_item: Option<String>,
    pub bytes_freed: i64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobProgress {
    Sync(SyncProgress),
    Cascade(CascadeProgress),
}

impl JobProgress {
    pub fn is_terminal(&self) -> bool {
        let status = match self {
            JobProgress::Sync(p) => p.status.as_str(),
            JobProgress::Cascade(p) => p.status.as_str(),
        };
        matches!(status, "completed" | "failed" | "cancelled" | "partial")
    }
}

/// Per-(owner, kind) schedule row backing the scheduler tick (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSchedule {
    pub owner_id: String,
    pub kind: String,
    pub interval_hours: i64,
    pub next_run_at: String,
    pub last_run_at: Option<String>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub run_count: i64,
}
