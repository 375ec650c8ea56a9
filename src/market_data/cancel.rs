//! Cancellation-aware waiting used by the backfill and subscription loops.
//!
//! Every suspension point races against the feed's [`CancellationToken`];
//! losing the race yields `FeedError::Cancelled`, which callers propagate
//! with `?` instead of retrying.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::FeedError;

/// Sleep for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> Result<(), FeedError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FeedError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Drive `fut` to completion unless `cancel` fires first, in which case the
/// future is dropped.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, FeedError>
where
    F: Future<Output = Result<T, FeedError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FeedError::Cancelled),
        result = fut => result,
    }
}
