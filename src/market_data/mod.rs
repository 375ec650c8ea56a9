//! Candle feeds: bounded buffers kept complete by a live stream plus a
//! one-off historical backfill.

pub mod backfill;
pub mod cancel;
pub mod candle_buffer;
pub mod feed;
pub mod live_merge;
pub mod normalize;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use backfill::{BackfillController, BackfillReport};
pub use candle_buffer::{Candle, CandleBuffer, Gap};
pub use feed::CandleFeed;
pub use live_merge::{LiveMerge, MergeOutcome, MergeSummary};
pub use table::{CandleTable, COLUMNS};
