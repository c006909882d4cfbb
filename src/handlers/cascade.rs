use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::Sse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::{CuratorError, CuratorResult};
use crate::jobs::progress::sse_stream;
use crate::models::job::JobKind;

#[derive(Debug, Deserialize)]
pub struct CascadeRequest {
    pub owner_id: String,
    pub rule_id: String,
    /// The exact candidate ids the admin reviewed via `GET /candidates` —
    /// the cascade never re-derives its own candidate set (spec.md §4.6).
    pub candidate_ids: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force: bool,
    /// Required when `dry_run` is false; must match the `confirm_token` the
    /// matching preview returned for this exact candidate set.
    pub confirm_token: Option<String>,
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: String,
}

pub async fn start_cascade(
    State(state): State<AppState>,
    Json(req): Json<CascadeRequest>,
) -> CuratorResult<(StatusCode, Json<serde_json::Value>)> {
    state.orchestrator.start_cascade(
        &req.owner_id,
        &req.rule_id,
        &req.candidate_ids,
        req.dry_run,
        req.force,
        req.confirm_token.as_deref(),
        &req.actor,
    )?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "started" }))))
}

pub async fn cancel_cascade(
    State(state): State<AppState>,
    Json(req): Json<OwnerQuery>,
) -> CuratorResult<StatusCode> {
    state.orchestrator.cancel(&req.owner_id, JobKind::CascadeDelete)?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn cascade_progress(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> CuratorResult<Json<crate::models::job::JobProgress>> {
    Ok(Json(state.orchestrator.progress(&q.owner_id, JobKind::CascadeDelete)?))
}

pub async fn cascade_stream(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> CuratorResult<Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>> {
    let rx = state
        .orchestrator
        .subscribe(&q.owner_id, JobKind::CascadeDelete)
        .map_err(|e| match e {
            CuratorError::NotFound(msg) => CuratorError::NotFound(msg),
            other => other,
        })?;
    Ok(Sse::new(sse_stream(rx)))
}
