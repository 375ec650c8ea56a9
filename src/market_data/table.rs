//! Tabular snapshot of a feed's buffer.

use serde::{Deserialize, Serialize};

use super::candle_buffer::Candle;

/// Column names of a [`CandleTable`], in row order.
pub const COLUMNS: [&str; 10] = [
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "quote_asset_volume",
    "n_trades",
    "taker_buy_base_volume",
    "taker_buy_quote_volume",
];

/// Point-in-time copy of a buffer, oldest row first. Timestamps are open
/// times in epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleTable {
    rows: Vec<Candle>,
}

impl CandleTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        COLUMNS.len()
    }

    pub fn rows(&self) -> &[Candle] {
        &self.rows
    }

    pub fn last(&self) -> Option<&Candle> {
        self.rows.last()
    }

    /// Rows as plain numeric records in [`COLUMNS`] order.
    pub fn records(&self) -> Vec<[f64; 10]> {
        self.rows.iter().map(Self::record).collect()
    }

    /// One column by name, or `None` for an unknown column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = COLUMNS.iter().position(|c| *c == name)?;
        Some(self.rows.iter().map(|c| Self::record(c)[idx]).collect())
    }

    fn record(c: &Candle) -> [f64; 10] {
        [
            c.open_time as f64,
            c.open,
            c.high,
            c.low,
            c.close,
            c.base_volume,
            c.quote_volume,
            c.trade_count as f64,
            c.taker_buy_base_volume,
            c.taker_buy_quote_volume,
        ]
    }
}

impl From<Vec<Candle>> for CandleTable {
    fn from(rows: Vec<Candle>) -> Self {
        Self { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::testing::live_candle;

    #[test]
    fn empty_table_keeps_its_shape() {
        let table = CandleTable::default();
        assert!(table.is_empty());
        assert_eq!(table.width(), 10);
        assert!(table.last().is_none());
        assert_eq!(table.column("close"), Some(Vec::new()));
    }

    #[test]
    fn columns_follow_row_order() {
        let mut second = live_candle(2_000, 11.0);
        second.trade_count = 45;
        let table = CandleTable::from(vec![live_candle(1_000, 10.0), second]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.column("timestamp"), Some(vec![1_000.0, 2_000.0]));
        assert_eq!(table.column("close"), Some(vec![10.0, 11.0]));
        assert_eq!(table.column("n_trades"), Some(vec![0.0, 45.0]));
        assert_eq!(table.column("vwap"), None);
        assert_eq!(table.records()[1][4], 11.0);
        assert_eq!(table.last().map(|c| c.open_time), Some(2_000));
    }
}
