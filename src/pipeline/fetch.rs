use crate::config::PageKind;
use crate::engine::{EngineSet, FetchError, FetchErrorKind, FetchResult};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fetches `urls` through a bounded worker pool
///
/// At most `width` fetches are in flight. Results come back in input order
/// regardless of completion order. Once `cancel` fires, no new fetch starts
/// and in-flight fetches resolve to `Cancelled` failures, so the output
/// always has one result per input URL.
pub async fn fetch_all(
    engines: &EngineSet,
    kind: PageKind,
    urls: &[String],
    width: usize,
    cancel: &CancellationToken,
) -> Vec<FetchResult> {
    stream::iter(urls)
        .map(|url| fetch_one(engines, kind, url, cancel))
        .buffered(width.max(1))
        .collect()
        .await
}

async fn fetch_one(
    engines: &EngineSet,
    kind: PageKind,
    url: &str,
    cancel: &CancellationToken,
) -> FetchResult {
    if cancel.is_cancelled() {
        return cancelled(url, "run cancelled before fetch started");
    }

    tokio::select! {
        _ = cancel.cancelled() => cancelled(url, "run cancelled during fetch"),
        result = engines.fetch(kind, url) => {
            tracing::debug!(
                url = %url,
                kind = ?kind,
                status = ?result.status_code,
                ok = result.ok,
                attempts = result.attempts,
                "Fetched page"
            );
            result
        }
    }
}

fn cancelled(url: &str, message: &str) -> FetchResult {
    FetchResult::failure(
        url,
        FetchError::new(FetchErrorKind::Cancelled, message, false),
        Duration::ZERO,
    )
}

/// Returns true for results produced by cancellation rather than a fetch
pub fn is_cancelled(result: &FetchResult) -> bool {
    result
        .error
        .as_ref()
        .is_some_and(|e| e.kind == FetchErrorKind::Cancelled)
}
