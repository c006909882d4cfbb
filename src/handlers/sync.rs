use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::Sse;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::CuratorResult;
use crate::jobs::progress::sse_stream;
use crate::models::job::JobKind;

#[derive(Debug, Deserialize)]
pub struct OwnerRequest {
    pub owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: String,
}

pub async fn start_library_sync(
    State(state): State<AppState>,
    Json(req): Json<OwnerRequest>,
) -> CuratorResult<(StatusCode, Json<serde_json::Value>)> {
    state.orchestrator.start_library_sync(&req.owner_id)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "started" }))))
}

pub async fn cancel_library_sync(
    State(state): State<AppState>,
    Json(req): Json<OwnerRequest>,
) -> CuratorResult<StatusCode> {
    state.orchestrator.cancel(&req.owner_id, JobKind::LibrarySync)?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn library_sync_progress(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> CuratorResult<Json<crate::models::job::JobProgress>> {
    Ok(Json(state.orchestrator.progress(&q.owner_id, JobKind::LibrarySync)?))
}

pub async fn library_sync_stream(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> CuratorResult<Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>> {
    let rx = state.orchestrator.subscribe(&q.owner_id, JobKind::LibrarySync)?;
    Ok(Sse::new(sse_stream(rx)))
}

pub async fn start_history_sync(
    State(state): State<AppState>,
    Json(req): Json<OwnerRequest>,
) -> CuratorResult<(StatusCode, Json<serde_json::Value>)> {
    state.orchestrator.start_history_sync(&req.owner_id)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "started" }))))
}

pub async fn cancel_history_sync(
    State(state): State<AppState>,
    Json(req): Json<OwnerRequest>,
) -> CuratorResult<StatusCode> {
    state.orchestrator.cancel(&req.owner_id, JobKind::HistorySync)?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn history_sync_progress(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> CuratorResult<Json<crate::models::job::JobProgress>> {
    Ok(Json(state.orchestrator.progress(&q.owner_id, JobKind::HistorySync)?))
}

pub async fn history_sync_stream(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> CuratorResult<Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>> {
    let rx = state.orchestrator.subscribe(&q.owner_id, JobKind::HistorySync)?;
    Ok(Sse::new(sse_stream(rx)))
}
