use serde::Deserialize;

use crate::error::CuratorResult;

use super::pacing::PacingPool;
use super::retry::{delete_is_success, send_with_retry};

/// TV downloader list companion: tracks which series are monitored for
/// automatic acquisition. Cascade deletion must unmonitor before deleting so
/// the show isn't immediately redownloaded (spec.md §4.6).
pub struct TdlClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    pacing: PacingPool,
    owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TdlSeries {
    pub id: String,
    pub monitored: bool,
}

impl TdlClient {
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

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn get_series(&self, series_id: &str) -> CuratorResult<Option<TdlSeries>> {
        let _permit = self.pacing.acquire(&self.owner_id, "tdl").await;
        let url = self.url(&format!("/api/v3/series/{series_id}"));
        let resp = send_with_retry(|| self.http.get(&url).header("X-Api-Key", &self.api_key), true)
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.json().await?))
    }

    /// Best-effort: unmonitor then delete the series and its files. Errors
    /// are reported to the caller, which treats this step as optional
    /// (spec.md §4.6 companion steps never fail the overall candidate).
    pub async fn unmonitor(&self, series_id: &str) -> CuratorResult<bool> {
        let _permit = self.pacing.acquire(&self.owner_id, "tdl").await;
        let url = self.url(&format!("/api/v3/series/{series_id}"));
        let body = serde_json::json!({ "monitored": false });
        let resp = send_with_retry(
            || {
                self.http
                    .put(&url)
                    .header("X-Api-Key", &self.api_key)
                    .json(&body)
            },
            true,
        )
        .await?;
        Ok(resp.status().is_success())
    }

    /// `add_exclusion` adds the series to the import list exclusion list so
    /// a monitored import list doesn't immediately re-add it (spec.md §4.6:
    /// set for show-level deletions, never for single episodes).
    pub async fn delete_series(
        &self,
        series_id: &str,
        delete_files: bool,
        add_exclusion: bool,
    ) -> CuratorResult<bool> {
        let _permit = self.pacing.acquire(&self.owner_id, "tdl").await;
        let url = self.url(&format!(
            "/api/v3/series/{series_id}?deleteFiles={delete_files}&addImportListExclusion={add_exclusion}"
        ));
        let resp = send_with_retry(|| self.http.delete(&url).header("X-Api-Key", &self.api_key), true)
            .await?;
        Ok(delete_is_success(resp.status()))
    }

    /// Resolves a series by its TheTVDB id, the way a sync pipeline
    /// discovers the `tdl_series_id` to store alongside a show (spec.md
    /// §4.6's "dead code" gap: nothing populated this field before).
    pub async fn resolve_by_tvdb_id(&self, tvdb_id: &str) -> CuratorResult<Option<String>> {
        let _permit = self.pacing.acquire(&self.owner_id, "tdl").await;
        let url = self.url(&format!("/api/v3/series/lookup?term=tvdb:{tvdb_id}"));
        let resp = send_with_retry(|| self.http.get(&url).header("X-Api-Key", &self.api_key), true)
            .await?;
        let matches: Vec<TdlSeries> = resp.json().await?;
        Ok(matches.into_iter().next().map(|s| s.id))
    }
}
