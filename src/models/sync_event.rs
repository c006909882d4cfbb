use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
    Webhook,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Scheduled => "scheduled",
            SyncTrigger::Webhook => "webhook",
        }
    }
}

/// One row per sync invocation (library or history). See spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: String,
    pub owner_id: String,
    pub kind: String,
    pub trigger: String,
    pub items_created: i64,
    pub items_updated: i64,
    pub items_failed: i64,
    pub status: String,
    pub error_message: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}
