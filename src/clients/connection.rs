use chrono::Utc;
use std::time::Duration;

use crate::error::CuratorResult;
use crate::mirror::MirrorStore;
use crate::models::server::Server;

/// Probes candidate base URLs for a Server and caches the fastest reachable
/// one on the row (spec.md §4.2). Re-probed when the cached entry is older
/// than `ttl_hours` or missing.
pub struct ConnectionProbe {
    client: reqwest::Client,
    probe_timeout: Duration,
    ttl_hours: i64,
}

impl ConnectionProbe {
    pub fn new(probe_timeout: Duration, ttl_hours: i64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(probe_timeout)
                .build()
                .expect("reqwest client builds"),
            probe_timeout,
            ttl_hours,
        }
    }

    pub fn needs_probe(&self, server: &Server) -> bool {
        match (&server.preferred_connection_url, &server.connection_tested_at) {
            (Some(_), Some(tested_at)) => {
                let Ok(tested_at) = chrono::DateTime::parse_from_rfc3339(tested_at) else {
                    return true;
                };
                let age = Utc::now() - tested_at.with_timezone(&Utc);
                age.num_hours() >= self.ttl_hours
            }
            _ => true,
        }
    }

    /// Tries each candidate URL's `/identity` endpoint in order and commits
    /// to the first one that answers (spec.md §4.2: candidates are ordered
    /// by preference — local before remote — so the first success wins
    /// rather than racing for the lowest latency, which would prefer a
    /// remote relay over a local connection on a noisy network).
    pub async fn probe_and_cache(
        &self,
        store: &MirrorStore,
        server_id: &str,
        candidates: &[String],
    ) -> CuratorResult<Option<String>> {
        for url in candidates {
            let started = std::time::Instant::now();
            let probe_url = format!("{}/identity", url.trim_end_matches('/'));
            match self.client.get(&probe_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let latency_ms = started.elapsed().as_millis() as i64;
                    store.update_server_connection(server_id, url, latency_ms)?;
                    return Ok(Some(url.clone()));
                }
                Ok(resp) => {
                    tracing::warn!(url, status = %resp.status(), "connection candidate rejected");
                }
                Err(e) => {
                    tracing::warn!(url, error = %e, "connection candidate unreachable");
                }
            }
        }

        let _ = self.probe_timeout;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_probe_when_never_tested() {
        let probe = ConnectionProbe::new(Duration::from_secs(5), 24);
        let server = Server {
            id: "s1".into(),
            owner_id: "o1".into(),
            name: "Main".into(),
            machine_id: "m1".into(),
            platform: None,
            version: None,
            status: "offline".into(),
            auth_token_ciphertext: String::new(),
            webhook_secret: "x".into(),
            preferred_connection_url: None,
            connection_latency_ms: None,
            connection_tested_at: None,
            last_full_sync_at: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(probe.needs_probe(&server));
    }
}
