use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationService {
    Ahs,
    Tdl,
    Mdl,
    Rqp,
}

impl IntegrationService {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationService::Ahs => "ahs",
            IntegrationService::Tdl => "tdl",
            IntegrationService::Mdl => "mdl",
            IntegrationService::Rqp => "rqp",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ahs" => Some(IntegrationService::Ahs),
            "tdl" => Some(IntegrationService::Tdl),
            "mdl" => Some(IntegrationService::Mdl),
            "rqp" => Some(IntegrationService::Rqp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Inactive,
    Active,
    Error,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Inactive => "inactive",
            IntegrationStatus::Active => "active",
            IntegrationStatus::Error => "error",
        }
    }
}

/// A configured companion service for one Server. Uniqueness: (owner,
/// service, name). See spec.md §3, §4.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub owner_id: String,
    pub server_id: String,
    pub service: String,
    pub name: String,
    pub base_url: String,
    /// Ciphertext of the API key, same AES-256-GCM shape as `Server::auth_token_ciphertext`.
    pub api_key_ciphertext: String,
    pub status: String,
    pub consecutive_failures: i64,
    pub last_failure_at: Option<String>,
    pub last_sync_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
