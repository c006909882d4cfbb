use std::convert::Infallible;

use axum::response::sse::Event;
use futures_util::Stream;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::models::job::JobProgress;

/// Adapts a progress watch channel into an SSE event stream, terminating
/// after the first terminal frame (spec.md §6) so clients don't hold a
/// connection open forever on a completed job.
pub fn sse_stream(rx: watch::Receiver<JobProgress>) -> impl Stream<Item = Result<Event, Infallible>> {
    WatchStream::new(rx)
        .scan(false, |done, progress| {
            if *done {
                return futures_util::future::ready(None);
            }
            if progress.is_terminal() {
                *done = true;
            }
            futures_util::future::ready(Some(progress))
        })
        .map(|progress| {
            let data = serde_json::to_string(&progress).unwrap_or_else(|_| "{}".into());
            Ok(Event::default().data(data))
        })
}
