use crate::error::CuratorResult;

use super::pacing::PacingPool;
use super::retry::{delete_is_success, send_with_retry};

/// Request queue processor: the last cascade step, clearing any pending user
/// request tied to a deleted item so it doesn't get silently re-requested
/// (spec.md §4.6, best-effort — failures here never block the candidate).
pub struct RqpClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    pacing: PacingPool,
    owner_id: String,
}

impl RqpClient {
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

    pub async fn clear_request_for(&self, external_id: &str) -> CuratorResult<bool> {
        let _permit = self.pacing.acquire(&self.owner_id, "rqp").await;
        let url = format!(
            "{}/api/v1/request/media/{external_id}",
            self.base_url.trim_end_matches('/')
        );
        let resp = send_with_retry(|| self.http.delete(&url).header("X-Api-Key", &self.api_key), true)
            .await?;
        Ok(delete_is_success(resp.status()))
    }
}
