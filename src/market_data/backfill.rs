// =============================================================================
// Backfill Controller — walks history backwards until the buffer is full
// =============================================================================
//
// Each request is anchored on the oldest resident open_time and asks for one
// row more than is missing: the exchange includes the anchor bucket itself,
// which the live path already owns. That row is dropped on prepend, so a page
// of N rows contributes at most N - 1 new candles and the request budget is
// sized accordingly.
//
// Failed requests are retried after a fixed delay and do not count against
// the budget. Cancellation ends the episode immediately.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cancel::{run_cancellable, sleep_or_cancel};
use super::candle_buffer::CandleBuffer;
use super::normalize::normalize_historical;
use crate::error::FeedError;
use crate::exchange::CandleSource;
use crate::runtime_config::FeedConfig;

/// Outcome of a completed backfill episode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Successful historical requests.
    pub requests: usize,
    /// Attempts that failed and were retried.
    pub failed_attempts: usize,
    /// Candles prepended to the buffer.
    pub inserted: usize,
}

/// Request budget for one episode: enough pages of `page_size - 1` new rows
/// to cover `max_records`.
pub fn max_requests_needed(max_records: usize, page_size: usize) -> usize {
    let per_request = page_size.saturating_sub(1).max(1);
    max_records.div_ceil(per_request).max(1)
}

pub struct BackfillController<S: CandleSource> {
    source: Arc<S>,
    buffer: Arc<CandleBuffer>,
    config: FeedConfig,
    retry_interval: Duration,
    feed_name: String,
}

impl<S: CandleSource> BackfillController<S> {
    pub fn new(
        source: Arc<S>,
        buffer: Arc<CandleBuffer>,
        config: FeedConfig,
        retry_interval: Duration,
        feed_name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            buffer,
            config,
            retry_interval,
            feed_name: feed_name.into(),
        }
    }

    /// Fill the buffer to capacity.
    ///
    /// Returns `BackfillBudgetExhausted` when the exchange runs out of history
    /// before the buffer is full, and `Cancelled` when `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<BackfillReport, FeedError> {
        let page_size = self.source.historical_page_size().max(1);
        let max_requests = max_requests_needed(self.config.max_records(), page_size);
        let mut report = BackfillReport::default();

        info!(
            feed = %self.feed_name,
            missing = self.buffer.remaining_capacity(),
            max_requests,
            "starting historical backfill"
        );

        while !self.buffer.is_full() {
            let Some(end_time) = self.buffer.oldest_open_time() else {
                warn!(feed = %self.feed_name, "buffer is empty, nothing to anchor backfill on");
                return Ok(report);
            };

            if report.requests >= max_requests {
                return Err(FeedError::BackfillBudgetExhausted {
                    feed: self.feed_name.clone(),
                    requests: report.requests,
                    missing: self.buffer.remaining_capacity(),
                });
            }

            let limit = (self.buffer.remaining_capacity() + 1).min(page_size);
            let fetch = self.source.fetch_historical(
                self.config.trading_pair(),
                self.config.interval(),
                Some(end_time),
                limit,
            );

            match run_cancellable(cancel, fetch).await {
                Ok(rows) => {
                    report.requests += 1;
                    if cancel.is_cancelled() {
                        return Err(FeedError::Cancelled);
                    }
                    let candles = normalize_historical(&*self.source, &rows);
                    // Capacity is re-measured under the buffer lock: live
                    // appends may have landed while the request was in flight.
                    let inserted = self.buffer.prepend_many(candles);
                    report.inserted += inserted;
                    debug!(
                        feed = %self.feed_name,
                        end_time,
                        limit,
                        received = rows.len(),
                        inserted,
                        "historical page merged"
                    );
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    report.failed_attempts += 1;
                    warn!(
                        feed = %self.feed_name,
                        error = %e,
                        retry_in_ms = self.retry_interval.as_millis() as u64,
                        "unexpected error occurred when getting historical candles, retrying"
                    );
                    sleep_or_cancel(cancel, self.retry_interval).await?;
                }
            }
        }

        info!(
            feed = %self.feed_name,
            requests = report.requests,
            inserted = report.inserted,
            "historical backfill complete"
        );
        self.report_gaps();
        Ok(report)
    }

    fn report_gaps(&self) {
        let interval = self.config.interval();
        if interval.is_calendar() {
            return;
        }
        let gaps = self.buffer.gaps(interval.millis());
        if !gaps.is_empty() {
            warn!(
                feed = %self.feed_name,
                count = gaps.len(),
                first_after = gaps[0].after,
                first_before = gaps[0].before,
                "buffer has gaps wider than one interval"
            );
        }
    }
}
