use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::AppState;
use crate::error::CuratorResult;
use crate::models::deletion_rule::CandidatePreview;
use crate::scoring::PreviewOptions;

#[derive(Debug, Deserialize)]
pub struct CandidateQuery {
    pub owner_id: String,
    pub rule_id: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub rollup_shows: bool,
    pub limit: Option<usize>,
    /// Comma-separated list, e.g. `movie,episode`.
    pub kind_filter: Option<String>,
    pub min_size_gb: Option<f64>,
}

pub async fn preview_candidates(
    State(state): State<AppState>,
    Query(q): Query<CandidateQuery>,
) -> CuratorResult<Json<CandidatePreview>> {
    let opts = PreviewOptions {
        force: q.force,
        rollup_shows: q.rollup_shows,
        limit: q.limit,
        kind_filter: q
            .kind_filter
            .map(|s| s.split(',').map(|k| k.trim().to_string()).collect()),
        min_size_gb: q.min_size_gb,
    };
    Ok(Json(state.orchestrator.preview_candidates(&q.owner_id, &q.rule_id, &opts)?))
}
