// =============================================================================
// Live Merge — applies streamed candle rows to the buffer
// =============================================================================
//
// Each live row is compared with the newest resident candle:
//   - buffer empty      -> append, and request the one-off backfill
//   - newer bucket      -> append
//   - same bucket       -> overwrite (the exchange streams partial buckets)
//   - older bucket      -> ignore
// =============================================================================

use std::sync::Arc;

use tracing::trace;

use super::candle_buffer::{Candle, CandleBuffer};

/// What a single live row did to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First row on an empty buffer.
    Seeded,
    Appended,
    Replaced,
    Ignored,
}

/// Decide the transition for a row at `open_time` given the newest resident
/// timestamp.
pub fn classify(open_time: i64, newest: Option<i64>) -> MergeOutcome {
    match newest {
        None => MergeOutcome::Seeded,
        Some(last) if open_time > last => MergeOutcome::Appended,
        Some(last) if open_time == last => MergeOutcome::Replaced,
        Some(_) => MergeOutcome::Ignored,
    }
}

/// Tally of one live message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub appended: usize,
    pub replaced: usize,
    pub ignored: usize,
    /// Set on the one message of this engine's lifetime that seeded the
    /// buffer; the caller must start the backfill.
    pub start_backfill: bool,
}

/// Live-path writer for one feed run, owned by its listen loop.
pub struct LiveMerge {
    buffer: Arc<CandleBuffer>,
    backfill_requested: bool,
}

impl LiveMerge {
    pub fn new(buffer: Arc<CandleBuffer>) -> Self {
        Self {
            buffer,
            backfill_requested: false,
        }
    }

    /// Apply the rows of one message in array order, so the last applicable
    /// row for a bucket wins.
    pub fn apply(&mut self, rows: impl IntoIterator<Item = Candle>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for candle in rows {
            let open_time = candle.open_time;
            let outcome = self.buffer.merge_live(candle);
            trace!(open_time, ?outcome, "live row merged");
            match outcome {
                MergeOutcome::Seeded => {
                    summary.appended += 1;
                    if !self.backfill_requested {
                        self.backfill_requested = true;
                        summary.start_backfill = true;
                    }
                }
                MergeOutcome::Appended => summary.appended += 1,
                MergeOutcome::Replaced => summary.replaced += 1,
                MergeOutcome::Ignored => summary.ignored += 1,
            }
        }
        summary
    }

    pub fn buffer(&self) -> &Arc<CandleBuffer> {
        &self.buffer
    }
}
