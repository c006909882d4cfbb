use serde::Deserialize;
use std::path::Path;

/// Top-level config loaded from `curator.toml`, overridable by env vars.
///
/// MS base URLs are never read from here — they are discovered and cached
/// per-`Server` row (see `clients::connection`). Integration credentials
/// live in the `integrations` table, not here. This file only carries
/// operational tuning knobs for the ambient stack.
#[derive(Debug, Clone, Deserialize)]
pub struct CuratorConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            sync: SyncConfig::default(),
            cascade: CascadeConfig::default(),
            webhook: WebhookConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ms_probe_timeout_secs")]
    pub ms_probe_timeout_secs: u64,
    #[serde(default = "default_connection_ttl_hours")]
    pub connection_ttl_hours: i64,
    #[serde(default = "default_concurrency_per_host")]
    pub concurrency_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            ms_probe_timeout_secs: default_ms_probe_timeout_secs(),
            connection_ttl_hours: default_connection_ttl_hours(),
            concurrency_per_host: default_concurrency_per_host(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}
fn default_ms_probe_timeout_secs() -> u64 {
    5
}
fn default_connection_ttl_hours() -> i64 {
    24
}
fn default_concurrency_per_host() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_full_sync_interval_days")]
    pub force_full_sync_after_days: i64,
    #[serde(default = "default_max_parallel_sections")]
    pub max_parallel_sections: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_throughput_window_secs")]
    pub throughput_window_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            force_full_sync_after_days: default_full_sync_interval_days(),
            max_parallel_sections: default_max_parallel_sections(),
            batch_size: default_batch_size(),
            throughput_window_secs: default_throughput_window_secs(),
        }
    }
}

fn default_full_sync_interval_days() -> i64 {
    7
}
fn default_max_parallel_sections() -> usize {
    4
}
fn default_batch_size() -> usize {
    500
}
fn default_throughput_window_secs() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CascadeConfig {
    #[serde(default = "default_cascade_concurrency")]
    pub concurrency_per_owner: usize,
    #[serde(default = "default_cascade_delay_ms")]
    pub inter_candidate_delay_ms: u64,
    #[serde(default = "default_candidate_timeout_secs")]
    pub candidate_timeout_secs: u64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_safety_percent")]
    pub safety_percent_of_total: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            concurrency_per_owner: default_cascade_concurrency(),
            inter_candidate_delay_ms: default_cascade_delay_ms(),
            candidate_timeout_secs: default_candidate_timeout_secs(),
            max_candidates: default_max_candidates(),
            safety_percent_of_total: default_safety_percent(),
        }
    }
}

fn default_cascade_concurrency() -> usize {
    3
}
fn default_cascade_delay_ms() -> u64 {
    100
}
fn default_candidate_timeout_secs() -> u64 {
    30
}
fn default_max_candidates() -> usize {
    10_000
}
fn default_safety_percent() -> f64 {
    25.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_body_cap_bytes")]
    pub body_cap_bytes: usize,
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            body_cap_bytes: default_webhook_body_cap_bytes(),
            debounce_secs: default_debounce_secs(),
        }
    }
}

fn default_webhook_body_cap_bytes() -> usize {
    64 * 1024
}
fn default_debounce_secs() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
        }
    }
}

fn default_tick_secs() -> u64 {
    60
}

impl CuratorConfig {
    /// Load config from a TOML file, falling back to defaults if missing.
    /// Individual fields may still be overridden by the `CURATOR_*` env vars
    /// read directly at their use sites (e.g. `CURATOR_TOKEN_KEY`,
    /// `CURATOR_MIRROR_DB`) — this file only covers tuning knobs, not secrets.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: CuratorConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let cfg = CuratorConfig::load("/nonexistent/curator.toml").unwrap();
        assert_eq!(cfg.cascade.concurrency_per_owner, 3);
        assert_eq!(cfg.webhook.body_cap_bytes, 64 * 1024);
    }

    #[test]
    fn parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curator.toml");
        std::fs::write(&path, "[cascade]\nsafety_percent_of_total = 40.0\n").unwrap();
        let cfg = CuratorConfig::load(&path).unwrap();
        assert_eq!(cfg.cascade.safety_percent_of_total, 40.0);
        assert_eq!(cfg.cascade.concurrency_per_owner, 3);
    }
}
