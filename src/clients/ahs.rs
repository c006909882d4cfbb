use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::CuratorResult;

use super::pacing::PacingPool;
use super::retry::send_with_retry;

/// Activity history service: an alternate engagement source used when the
/// owner's MS instance doesn't retain long-lived watch history itself
/// (spec.md §4.4 source selection).
pub struct ActivityHistoryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    pacing: PacingPool,
    owner_id: String,
}

/// One raw play record. AHS reports these per-play, not pre-aggregated —
/// a show watched three times yields three records with the same
/// `external_id` (spec.md §4.4).
#[derive(Debug, Deserialize)]
pub struct AhsHistoryRecord {
    pub external_id: String,
    pub watched_at: DateTime<Utc>,
    pub percent_complete: f64,
    #[serde(default)]
    pub paused_counter_seconds: i64,
    #[serde(default)]
    pub duration_watched_seconds: i64,
}

impl ActivityHistoryClient {
    pub fn new(
        base_url: String,
        api_key: String,
        pacing: PacingPool,
        owner_id: String,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client builds"),
            base_url,
            api_key,
            pacing,
            owner_id,
        }
    }

    pub async fn fetch_history(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> CuratorResult<Vec<AhsHistoryRecord>> {
        let _permit = self.pacing.acquire(&self.owner_id, "ahs").await;
        let mut url = format!("{}/history", self.base_url.trim_end_matches('/'));
        if let Some(since) = since {
            url = format!("{url}?since={}", since.to_rfc3339());
        }
        let resp = send_with_retry(
            || self.http.get(&url).header("X-Api-Key", &self.api_key),
            true,
        )
        .await?;
        Ok(resp.json().await?)
    }
}
