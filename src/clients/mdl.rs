use serde::Deserialize;

use crate::error::CuratorResult;

use super::pacing::PacingPool;
use super::retry::{delete_is_success, send_with_retry};

/// Movie downloader list companion — the MDL equivalent of `TdlClient` for
/// movies, keyed by `mdl_movie_id` (spec.md §4.6).
pub struct MdlClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    pacing: PacingPool,
    owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MdlMovie {
    pub id: String,
    pub monitored: bool,
}

impl MdlClient {
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

    pub async fn get_movie(&self, movie_id: &str) -> CuratorResult<Option<MdlMovie>> {
        let _permit = self.pacing.acquire(&self.owner_id, "mdl").await;
        let url = self.url(&format!("/api/v3/movie/{movie_id}"));
        let resp = send_with_retry(|| self.http.get(&url).header("X-Api-Key", &self.api_key), true)
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.json().await?))
    }

    pub async fn unmonitor(&self, movie_id: &str) -> CuratorResult<bool> {
        let _permit = self.pacing.acquire(&self.owner_id, "mdl").await;
        let url = self.url(&format!("/api/v3/movie/{movie_id}"));
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

    pub async fn delete_movie(&self, movie_id: &str, delete_files: bool) -> CuratorResult<bool> {
        let _permit = self.pacing.acquire(&self.owner_id, "mdl").await;
        let url = self.url(&format!(
            "/api/v3/movie/{movie_id}?deleteFiles={delete_files}"
        ));
        let resp = send_with_retry(|| self.http.delete(&url).header("X-Api-Key", &self.api_key), true)
            .await?;
        Ok(delete_is_success(resp.status()))
    }

    /// Resolves a movie by its TMDB id. Mirrors `TdlClient::resolve_by_tvdb_id`.
    pub async fn resolve_by_tmdb_id(&self, tmdb_id: &str) -> CuratorResult<Option<String>> {
        let _permit = self.pacing.acquire(&self.owner_id, "mdl").await;
        let url = self.url(&format!("/api/v3/movie/lookup?term=tmdb:{tmdb_id}"));
        let resp = send_with_retry(|| self.http.get(&url).header("X-Api-Key", &self.api_key), true)
            .await?;
        let matches: Vec<MdlMovie> = resp.json().await?;
        Ok(matches.into_iter().next().map(|m| m.id))
    }
}
