use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::AppState;
use crate::error::CuratorError;

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    /// Fallback for adapters that can't set a custom header on outgoing
    /// webhook requests; the `X-Webhook-Secret` header takes precedence.
    secret: Option<String>,
}

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path((service, owner_id)): Path<(String, String)>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if body.len() > state.webhook.body_cap_bytes() {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let provided_secret = headers
        .get("X-Webhook-Secret")
        .and_then(|v| v.to_str().ok())
        .or(query.secret.as_deref());
    let signature = headers.get("X-Webhook-Signature").and_then(|v| v.to_str().ok());

    match state.webhook.handle(&owner_id, &service, provided_secret, signature, &body).await {
        Ok(event) => (StatusCode::ACCEPTED, Json(event)).into_response(),
        Err(CuratorError::Auth(_)) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
