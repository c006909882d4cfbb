use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};

use crate::error::CuratorError;

/// Backoff schedule shared by every outbound client (spec.md §4.2): three
/// attempts total, waiting 0.25s/1s/4s between them.
const BACKOFF: [Duration; 3] = [
    Duration::from_millis(250),
    Duration::from_secs(1),
    Duration::from_secs(4),
];

/// Sends a request, retrying on network errors always and on 5xx only when
/// `idempotent` is true (GET/HEAD/DELETE). 401/403 short-circuit to
/// `CuratorError::Auth` without consuming a retry.
pub async fn send_with_retry(
    build: impl Fn() -> RequestBuilder,
    idempotent: bool,
) -> Result<reqwest::Response, CuratorError> {
    let mut last_err = None;
    for (attempt, delay) in BACKOFF.iter().enumerate() {
        let result = build().send().await;
        match result {
            Ok(resp) => {
                let status = resp.status();
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    return Err(CuratorError::Auth(format!("rejected with {status}")));
                }
                if status.is_server_error() && idempotent && attempt + 1 < BACKOFF.len() {
                    tracing::warn!(%status, attempt, "retrying after server error");
                    last_err = Some(CuratorError::Transient(format!("server error {status}")));
                    tokio::time::sleep(*delay).await;
                    continue;
                }
                return Ok(resp);
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "retrying after transport error");
                last_err = Some(CuratorError::Transient(e.to_string()));
                if attempt + 1 < BACKOFF.len() {
                    tokio::time::sleep(*delay).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| CuratorError::Transient("retry attempts exhausted".into())))
}

/// A DELETE that 404s is treated as already-deleted, not a failure.
pub fn delete_is_success(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_FOUND
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_treats_404_as_success() {
        assert!(delete_is_success(StatusCode::NOT_FOUND));
        assert!(delete_is_success(StatusCode::NO_CONTENT));
        assert!(!delete_is_success(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
