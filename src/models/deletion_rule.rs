use serde::{Deserialize, Serialize};

/// Admin policy driving candidate selection. See spec.md §3, §4.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRule {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub enabled: bool,
    pub dry_run_mode: bool,
    pub grace_period_days: i64,
    pub inactivity_threshold_days: i64,
    pub min_rating: Option<f64>,
    /// JSON-encoded `Vec<String>` of kinds excluded outright (e.g. rules that
    /// never touch movies). Stored as JSON text, matching the teacher's
    /// `notification_channel_ids` convention for list-valued sqlite columns.
    pub excluded_kinds: String,
    pub excluded_libraries: String,
    pub excluded_genres: String,
    pub excluded_collections: String,
    pub created_by: String,
    pub last_run_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DeletionRule {
    pub fn excluded_kinds_list(&self) -> Vec<String> {
        serde_json::from_str(&self.excluded_kinds).unwrap_or_default()
    }
    pub fn excluded_libraries_list(&self) -> Vec<String> {
        serde_json::from_str(&self.excluded_libraries).unwrap_or_default()
    }
    pub fn excluded_genres_list(&self) -> Vec<String> {
        serde_json::from_str(&self.excluded_genres).unwrap_or_default()
    }
    pub fn excluded_collections_list(&self) -> Vec<String> {
        serde_json::from_str(&self.excluded_collections).unwrap_or_default()
    }
}

/// A MediaItem proposed for deletion by a rule, with the evidence an admin
/// reviews before confirming. See spec.md §4.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub media_item_id: String,
    pub title: String,
    pub kind: String,
    pub file_size_bytes: i64,
    pub days_since_added: i64,
    pub days_since_watched: i64,
    pub library_section: Option<String>,
    pub rating: Option<f64>,
    pub tmdb_id: Option<String>,
    pub tdl_series_id: Option<String>,
    pub mdl_movie_id: Option<String>,
    pub grandparent_title: Option<String>,
    /// True when this candidate reached the cascade as one episode of an
    /// admin-confirmed show-level deletion rather than standing on its own
    /// (spec.md §4.5/§4.6). Drives whether TDL is touched at all, and if so
    /// with which flags, in `CascadeExecutor`.
    #[serde(default)]
    pub show_origin: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidatePreview {
    pub candidates: Vec<Candidate>,
    pub total_matched: usize,
    pub capped: bool,
    pub requires_force: bool,
    pub total_catalog_size: usize,
    /// Checksum over (owner, rule, displayed candidate ids) an admin must
    /// echo back on `POST /cascade` when `dry_run=false` (spec.md §4.6), so
    /// a confirm call can only target the exact set a preview just showed.
    pub confirm_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowAggregate {
    pub grandparent_title: String,
    pub episode_count: i64,
    pub total_size_bytes: i64,
    pub last_watched_at: Option<String>,
    pub total_plays: i64,
    pub episode_media_item_ids: Vec<String>,
}
