use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionStatus {
    Pending,
    Completed,
    Partial,
    Failed,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStatus::Pending => "pending",
            DeletionStatus::Completed => "completed",
            DeletionStatus::Partial => "partial",
            DeletionStatus::Failed => "failed",
        }
    }
}

/// Immutable audit row per candidate processed by a cascade. Outlives the
/// MediaItem row it describes — no FK to `media_items` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionEvent {
    pub id: String,
    pub owner_id: String,
    pub rule_id: Option<String>,

    pub media_item_id: String,
    pub title: String,
    pub kind: String,
    pub file_size_bytes: i64,
    pub file_path: Option<String>,

    pub reason: String,
    pub score: f64,

    pub deleted_from_ms: bool,
    pub deleted_from_ms_at: Option<String>,
    pub deleted_from_tdl: bool,
    pub deleted_from_tdl_at: Option<String>,
    pub deleted_from_mdl: bool,
    pub deleted_from_mdl_at: Option<String>,
    pub deleted_from_rqp: bool,
    pub deleted_from_rqp_at: Option<String>,

    pub dry_run: bool,
    pub status: String,
    pub actor: String,
    pub deleted_at: String,
    pub error_message: Option<String>,
}
