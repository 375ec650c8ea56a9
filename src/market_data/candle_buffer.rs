use std::collections::VecDeque;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::live_merge::{self, MergeOutcome};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle in the canonical ten-field shape.
///
/// Fields the source does not provide (trade count and taker volumes on the
/// live path) are zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub trade_count: u64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
}

/// Two neighbouring candles further apart than one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub after: i64,
    pub before: i64,
}

// ---------------------------------------------------------------------------
// CandleBuffer -- bounded double-ended ring for one (pair, interval) feed
// ---------------------------------------------------------------------------

/// Thread-safe bounded deque of candles ordered by strictly increasing
/// `open_time`.
///
/// The live path writes at the newest end, backfill writes at the oldest end.
/// Every operation takes the lock exactly once and never across an await
/// point, so readers never see a half-applied write.
pub struct CandleBuffer {
    ring: RwLock<VecDeque<Candle>>,
    max_records: usize,
}

impl CandleBuffer {
    pub fn new(max_records: usize) -> Self {
        Self {
            ring: RwLock::new(VecDeque::with_capacity(max_records + 1)),
            max_records,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_records
    }

    pub fn len(&self) -> usize {
        self.ring.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.read().is_empty()
    }

    /// The readiness predicate: the buffer holds `max_records` candles.
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_records
    }

    pub fn remaining_capacity(&self) -> usize {
        self.max_records.saturating_sub(self.len())
    }

    pub fn oldest_open_time(&self) -> Option<i64> {
        self.ring.read().front().map(|c| c.open_time)
    }

    pub fn newest_open_time(&self) -> Option<i64> {
        self.ring.read().back().map(|c| c.open_time)
    }

    pub fn newest(&self) -> Option<Candle> {
        self.ring.read().back().cloned()
    }

    /// Push `candle` at the newest end, evicting the oldest record when the
    /// buffer overflows.
    ///
    /// Returns `false` (and leaves the buffer untouched) when `candle` is not
    /// strictly newer than the current newest record.
    pub fn append(&self, candle: Candle) -> bool {
        let mut ring = self.ring.write();
        if ring.back().is_some_and(|last| candle.open_time <= last.open_time) {
            return false;
        }
        self.push_newest(&mut ring, candle);
        true
    }

    /// Overwrite the newest record if it shares `candle.open_time`.
    pub fn replace_last(&self, candle: Candle) -> bool {
        let mut ring = self.ring.write();
        match ring.back_mut() {
            Some(last) if last.open_time == candle.open_time => {
                *last = candle;
                true
            }
            _ => false,
        }
    }

    /// Apply one live row: append, replace the open bucket, or ignore a stale
    /// row, decided and written under a single lock.
    pub fn merge_live(&self, candle: Candle) -> MergeOutcome {
        let mut ring = self.ring.write();
        let outcome = live_merge::classify(candle.open_time, ring.back().map(|c| c.open_time));
        match outcome {
            MergeOutcome::Seeded | MergeOutcome::Appended => self.push_newest(&mut ring, candle),
            MergeOutcome::Replaced => {
                if let Some(last) = ring.back_mut() {
                    *last = candle;
                }
            }
            MergeOutcome::Ignored => {}
        }
        outcome
    }

    /// Insert an ascending batch at the oldest end.
    ///
    /// Rows that are not strictly older than the current oldest resident, and
    /// rows that do not advance past the previous accepted row, are dropped.
    /// Only the newest rows that fit in the remaining capacity are kept, so a
    /// prepend never evicts anything already resident. Returns the number of
    /// rows inserted.
    pub fn prepend_many(&self, batch: impl IntoIterator<Item = Candle>) -> usize {
        let mut ring = self.ring.write();
        let bound = ring.front().map(|c| c.open_time);

        let mut accepted: Vec<Candle> = Vec::new();
        for candle in batch {
            if bound.is_some_and(|b| candle.open_time >= b) {
                continue;
            }
            if accepted
                .last()
                .is_some_and(|prev| candle.open_time <= prev.open_time)
            {
                continue;
            }
            accepted.push(candle);
        }

        let room = self.max_records.saturating_sub(ring.len());
        let skip = accepted.len().saturating_sub(room);
        let inserted = accepted.len() - skip;
        for candle in accepted.drain(skip..).rev() {
            ring.push_front(candle);
        }
        inserted
    }

    /// Ordered copy of every resident candle (oldest first).
    pub fn snapshot(&self) -> Vec<Candle> {
        self.ring.read().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.ring.write().clear();
    }

    /// Neighbouring pairs whose distance exceeds `step_ms`.
    pub fn gaps(&self, step_ms: i64) -> Vec<Gap> {
        let ring = self.ring.read();
        ring.iter()
            .zip(ring.iter().skip(1))
            .filter(|(a, b)| b.open_time - a.open_time > step_ms)
            .map(|(a, b)| Gap {
                after: a.open_time,
                before: b.open_time,
            })
            .collect()
    }

    fn push_newest(&self, ring: &mut VecDeque<Candle>, candle: Candle) {
        ring.push_back(candle);
        while ring.len() > self.max_records {
            ring.pop_front();
        }
    }
}

impl std::fmt::Debug for CandleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.read();
        f.debug_struct("CandleBuffer")
            .field("len", &ring.len())
            .field("max_records", &self.max_records)
            .field("oldest", &ring.front().map(|c| c.open_time))
            .field("newest", &ring.back().map(|c| c.open_time))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    fn sample_candle(open_time: i64, close: f64) -> Candle {
        Candle {
            open_time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            base_volume: 10.0,
            quote_volume: 20.0,
            trade_count: 5,
            taker_buy_base_volume: 6.0,
            taker_buy_quote_volume: 12.0,
        }
    }

    fn open_times(buf: &CandleBuffer) -> Vec<i64> {
        buf.snapshot().iter().map(|c| c.open_time).collect()
    }

    fn assert_strictly_increasing(buf: &CandleBuffer) {
        let times = open_times(buf);
        assert!(times.windows(2).all(|w| w[0] < w[1]), "not ordered: {times:?}");
    }

    #[test]
    fn append_evicts_oldest_beyond_capacity() {
        let buf = CandleBuffer::new(3);
        for i in 0..5 {
            assert!(buf.append(sample_candle(i * HOUR, 100.0 + i as f64)));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(open_times(&buf), vec![2 * HOUR, 3 * HOUR, 4 * HOUR]);
        assert!(buf.is_full());
    }

    #[test]
    fn append_rejects_non_increasing_open_time() {
        let buf = CandleBuffer::new(5);
        assert!(buf.append(sample_candle(HOUR, 1.0)));
        assert!(!buf.append(sample_candle(HOUR, 2.0)));
        assert!(!buf.append(sample_candle(0, 3.0)));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.newest().unwrap().close, 1.0);
    }

    #[test]
    fn replace_last_keeps_length_and_overwrites_all_fields() {
        let buf = CandleBuffer::new(5);
        buf.append(sample_candle(0, 1.0));
        buf.append(sample_candle(HOUR, 2.0));

        let mut update = sample_candle(HOUR, 9.0);
        update.trade_count = 0;
        update.quote_volume = 0.0;
        assert!(buf.replace_last(update.clone()));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.newest().unwrap(), update);

        assert!(!buf.replace_last(sample_candle(2 * HOUR, 3.0)));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn prepend_fills_only_remaining_capacity_with_newest_rows() {
        let buf = CandleBuffer::new(4);
        buf.append(sample_candle(10 * HOUR, 1.0));

        let batch: Vec<Candle> = (5..10).map(|i| sample_candle(i * HOUR, i as f64)).collect();
        assert_eq!(buf.prepend_many(batch), 3);
        assert_eq!(open_times(&buf), vec![7 * HOUR, 8 * HOUR, 9 * HOUR, 10 * HOUR]);
    }

    #[test]
    fn prepend_drops_rows_colliding_with_resident_records() {
        let buf = CandleBuffer::new(10);
        buf.append(sample_candle(3 * HOUR, 1.0));
        buf.append(sample_candle(4 * HOUR, 2.0));

        let batch = vec![
            sample_candle(HOUR, 0.1),
            sample_candle(2 * HOUR, 0.2),
            sample_candle(3 * HOUR, 0.3),
            sample_candle(4 * HOUR, 0.4),
        ];
        assert_eq!(buf.prepend_many(batch), 2);
        assert_eq!(open_times(&buf), vec![HOUR, 2 * HOUR, 3 * HOUR, 4 * HOUR]);
        // Live-owned record untouched.
        assert_eq!(buf.snapshot()[2].close, 1.0);
    }

    #[test]
    fn prepend_drops_duplicates_inside_the_batch() {
        let buf = CandleBuffer::new(10);
        buf.append(sample_candle(5 * HOUR, 1.0));
        let batch = vec![
            sample_candle(HOUR, 0.1),
            sample_candle(HOUR, 0.2),
            sample_candle(2 * HOUR, 0.3),
            sample_candle(HOUR, 0.4),
        ];
        assert_eq!(buf.prepend_many(batch), 2);
        assert_strictly_increasing(&buf);
        assert_eq!(buf.snapshot()[0].close, 0.1);
    }

    #[test]
    fn prepend_on_full_buffer_inserts_nothing() {
        let buf = CandleBuffer::new(2);
        buf.append(sample_candle(5 * HOUR, 1.0));
        buf.append(sample_candle(6 * HOUR, 2.0));
        assert_eq!(buf.prepend_many(vec![sample_candle(HOUR, 0.0)]), 0);
        assert_eq!(open_times(&buf), vec![5 * HOUR, 6 * HOUR]);
    }

    #[test]
    fn mixed_operations_preserve_invariants() {
        let buf = CandleBuffer::new(6);
        let mut seed = 7u64;
        for step in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let t = ((seed >> 33) % 50) as i64 * HOUR;
            match step % 3 {
                0 => {
                    buf.append(sample_candle(t, 1.0));
                }
                1 => {
                    buf.replace_last(sample_candle(t, 2.0));
                }
                _ => {
                    let batch: Vec<Candle> =
                        (0..4).map(|k| sample_candle(t + k * HOUR, 3.0)).collect();
                    buf.prepend_many(batch);
                }
            }
            buf.merge_live(sample_candle(t, 4.0));
            assert!(buf.len() <= 6);
            assert_strictly_increasing(&buf);
        }
    }

    #[test]
    fn empty_buffer_queries_return_empty_results() {
        let buf = CandleBuffer::new(3);
        assert!(buf.snapshot().is_empty());
        assert_eq!(buf.oldest_open_time(), None);
        assert_eq!(buf.newest_open_time(), None);
        assert!(buf.newest().is_none());
        assert!(buf.gaps(HOUR).is_empty());
        assert_eq!(buf.remaining_capacity(), 3);
        assert!(!buf.replace_last(sample_candle(0, 1.0)));
    }

    #[test]
    fn gaps_reports_missing_buckets() {
        let buf = CandleBuffer::new(10);
        for t in [0, HOUR, 2 * HOUR, 5 * HOUR, 6 * HOUR] {
            buf.append(sample_candle(t, 1.0));
        }
        assert_eq!(
            buf.gaps(HOUR),
            vec![Gap {
                after: 2 * HOUR,
                before: 5 * HOUR
            }]
        );
    }
}
