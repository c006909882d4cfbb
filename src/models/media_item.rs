use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
    Season,
    Episode,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
            MediaKind::Season => "season",
            MediaKind::Episode => "episode",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(MediaKind::Movie),
            "show" => Some(MediaKind::Show),
            "season" => Some(MediaKind::Season),
            "episode" => Some(MediaKind::Episode),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, MediaKind::Movie | MediaKind::Episode)
    }
}

/// One row per addressable unit MS exposes. See spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub owner_id: String,
    pub server_id: String,
    pub external_id: String,
    pub kind: String,
    pub title: String,
    pub year: Option<i64>,
    pub runtime_minutes: Option<i64>,

    pub tmdb_id: Option<String>,
    pub tvdb_id: Option<String>,
    pub imdb_id: Option<String>,
    pub tdl_series_id: Option<String>,
    pub mdl_movie_id: Option<String>,

    pub library_section: Option<String>,
    pub genres: Option<String>,
    pub collections: Option<String>,
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
    pub file_size_bytes: i64,
    pub accessible: bool,

    pub total_play_count: i64,
    pub complete_play_count: i64,
    pub partial_play_count: i64,
    pub avg_percent_complete: Option<f64>,
    pub last_watched_at: Option<String>,
    pub total_watch_time_seconds: i64,

    pub added_at: String,
    pub updated_at: String,
    pub history_synced_at: Option<String>,
}

/// A partial record used to upsert a MediaItem. Unspecified fields (`None`)
/// preserve the existing row's value — except where noted in §4.1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaItemPatch {
    pub kind: Option<String>,
    pub title: Option<String>,
    pub year: Option<i64>,
    pub runtime_minutes: Option<i64>,

    pub tmdb_id: Option<String>,
    pub tvdb_id: Option<String>,
    pub imdb_id: Option<String>,
    pub tdl_series_id: Option<String>,
    pub mdl_movie_id: Option<String>,

    pub library_section: Option<String>,
    pub genres: Option<String>,
    pub collections: Option<String>,
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
    pub accessible: Option<bool>,

    /// Engagement fields, when present, are merged by HistorySync's policy
    /// (§4.4), not overwritten wholesale like quality/hierarchy fields.
    pub total_play_count: Option<i64>,
    pub complete_play_count: Option<i64>,
    pub partial_play_count: Option<i64>,
    pub avg_percent_complete: Option<f64>,
    pub last_watched_at: Option<String>,
    pub total_watch_time_seconds: Option<i64>,
    pub history_synced_at: Option<String>,
}

impl MediaItemPatch {
    /// True when the patch carries the hierarchy fields an episode requires.
    pub fn has_episode_hierarchy(&self) -> bool {
        self.grandparent_title.is_some()
            && self.season_number.is_some()
            && self.episode_number.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
