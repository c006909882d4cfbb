use serde::{Deserialize, Serialize};

/// One row per webhook intake. See spec.md §3, §4.8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub owner_id: String,
    pub service: String,
    pub payload_hash: String,
    pub processing_status: String,
    pub actions_triggered: String,
    pub received_at: String,
}
