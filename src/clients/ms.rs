use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::CuratorResult;
use crate::models::media_item::MediaItemPatch;

use super::pacing::PacingPool;
use super::retry::{delete_is_success, send_with_retry};

/// Wraps one MS instance. `base_url` and `auth_token` come from the caller
/// (resolved via `ConnectionProbe` and `TokenCipher` respectively) — this
/// client never touches the mirror or the ciphertext itself.
pub struct MediaServerClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
    pacing: PacingPool,
    owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MsSection {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct MsItem {
    pub external_id: String,
    pub kind: String,
    pub title: String,
    pub year: Option<i64>,
    pub runtime_minutes: Option<i64>,
    pub tmdb_id: Option<String>,
    pub tvdb_id: Option<String>,
    pub imdb_id: Option<String>,
    pub genres: Option<Vec<String>>,
    pub collections: Option<Vec<String>>,
    pub rating: Option<f64>,
    pub grandparent_title: Option<String>,
    pub parent_title: Option<String>,
    pub season_number: Option<i64>,
    pub episode_number: Option<i64>,
    pub video_resolution: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub container: Option<String>,
    pub bitrate_kbps: Option<i64>,
    pub file_path: Option<String>,
    pub file_size_bytes: Option<i64>,
    #[serde(default = "default_true")]
    pub accessible: bool,
}

fn default_true() -> bool {
    true
}

impl MsItem {
    /// `tdl_series_id`/`mdl_movie_id` are resolved by the caller (via
    /// `TdlClient::resolve_by_tvdb_id`/`MdlClient::resolve_by_tmdb_id`)
    /// before this is called — MS itself has no notion of either id.
    pub fn into_patch(
        self,
        library_section: &str,
        tdl_series_id: Option<String>,
        mdl_movie_id: Option<String>,
    ) -> MediaItemPatch {
        MediaItemPatch {
            kind: Some(self.kind),
            title: Some(self.title),
            year: self.year,
            runtime_minutes: self.runtime_minutes,
            tmdb_id: self.tmdb_id,
            tvdb_id: self.tvdb_id,
            imdb_id: self.imdb_id,
            tdl_series_id,
            mdl_movie_id,
            library_section: Some(library_section.to_string()),
            genres: self.genres.map(|g| serde_json::to_string(&g).unwrap_or_else(|_| "[]".into())),
            collections: self
                .collections
                .map(|c| serde_json::to_string(&c).unwrap_or_else(|_| "[]".into())),
            rating: self.rating,
            grandparent_title: self.grandparent_title,
            parent_title: self.parent_title,
            season_number: self.season_number,
            episode_number: self.episode_number,
            video_resolution: self.video_resolution,
            video_codec: self.video_codec,
            audio_codec: self.audio_codec,
            container: self.container,
            bitrate_kbps: self.bitrate_kbps,
            file_path: self.file_path,
            file_size_bytes: self.file_size_bytes,
            accessible: Some(self.accessible),
            total_play_count: None,
            complete_play_count: None,
            partial_play_count: None,
            avg_percent_complete: None,
            last_watched_at: None,
            total_watch_time_seconds: None,
            history_synced_at: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MsHistoryRecord {
    pub external_id: String,
    pub viewed_at: DateTime<Utc>,
    pub view_offset_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl MediaServerClient {
    pub fn new(
        base_url: String,
        auth_token: String,
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
            auth_token,
            pacing,
            owner_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn list_sections(&self) -> CuratorResult<Vec<MsSection>> {
        let _permit = self.pacing.acquire(&self.owner_id, "ms").await;
        let url = self.url("/library/sections");
        let resp = send_with_retry(
            || self.http.get(&url).bearer_auth(&self.auth_token),
            true,
        )
        .await?;
        Ok(resp.json().await?)
    }

    pub async fn list_items(&self, section_id: &str) -> CuratorResult<Vec<MsItem>> {
        let _permit = self.pacing.acquire(&self.owner_id, "ms").await;
        let url = self.url(&format!("/library/sections/{section_id}/items"));
        let resp = send_with_retry(
            || self.http.get(&url).bearer_auth(&self.auth_token),
            true,
        )
        .await?;
        Ok(resp.json().await?)
    }

    pub async fn fetch_history(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> CuratorResult<Vec<MsHistoryRecord>> {
        let _permit = self.pacing.acquire(&self.owner_id, "ms").await;
        let mut url = self.url("/status/sessions/history/all");
        if let Some(since) = since {
            url = format!("{url}?since={}", since.to_rfc3339());
        }
        let resp = send_with_retry(
            || self.http.get(&url).bearer_auth(&self.auth_token),
            true,
        )
        .await?;
        Ok(resp.json().await?)
    }

    /// Deletes the underlying file. A 404 counts as success — already gone.
    pub async fn delete_item(&self, external_id: &str) -> CuratorResult<bool> {
        let _permit = self.pacing.acquire(&self.owner_id, "ms").await;
        let url = self.url(&format!("/library/metadata/{external_id}"));
        let resp = send_with_retry(|| self.http.delete(&url).bearer_auth(&self.auth_token), true).await?;
        Ok(delete_is_success(resp.status()))
    }
}
