use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Online,
    Offline,
    Error,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Online => "online",
            ServerStatus::Offline => "offline",
            ServerStatus::Error => "error",
        }
    }
}

/// One MS instance bound to one owning administrator. See spec.md §3, §4.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub machine_id: String,
    pub platform: Option<String>,
    pub version: Option<String>,
    pub status: String,

    /// Ciphertext of the MS auth token, AES-256-GCM, base64-encoded nonce||ct.
    pub auth_token_ciphertext: String,
    pub webhook_secret: String,

    pub preferred_connection_url: Option<String>,
    pub connection_latency_ms: Option<i64>,
    pub connection_tested_at: Option<String>,

    pub last_full_sync_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
