use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Crate-wide error taxonomy (spec.md §7). Per-item errors inside sync and
/// cascade pipelines are counted, not propagated through this type — this is
/// for job-fatal and request-level failures only.
#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("safety bound exceeded: {0}")]
    Safety(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CuratorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CuratorError::Auth(_) => StatusCode::UNAUTHORIZED,
            CuratorError::Transient(_) => StatusCode::BAD_GATEWAY,
            CuratorError::NotFound(_) => StatusCode::NOT_FOUND,
            CuratorError::Validation(_) => StatusCode::BAD_REQUEST,
            CuratorError::Conflict(_) => StatusCode::CONFLICT,
            CuratorError::Safety(_) => StatusCode::PRECONDITION_REQUIRED,
            CuratorError::Integrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CuratorError::Database(_) | CuratorError::Http(_) | CuratorError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for CuratorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::warn!("{self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type CuratorResult<T> = Result<T, CuratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_cover_taxonomy() {
        assert_eq!(CuratorError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(CuratorError::Transient("x".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(CuratorError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(CuratorError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(CuratorError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            CuratorError::Safety("x".into()).status_code(),
            StatusCode::PRECONDITION_REQUIRED
        );
        assert_eq!(
            CuratorError::Integrity("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
