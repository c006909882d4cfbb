pub use tokio_util::sync::CancellationToken;

/// Checks a job's cancellation token at one of the documented suspension
/// points (spec.md §5: between library sections, between sync batches,
/// between cascade candidates). Logs once per check site rather than
/// silently dropping work.
pub fn observed(cancel: &CancellationToken, where_: &str) -> bool {
    if cancel.is_cancelled() {
        tracing::info!(at = where_, "job cancellation observed");
        true
    } else {
        false
    }
}
