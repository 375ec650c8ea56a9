// =============================================================================
// Foxbit wire formats -> Candle
// =============================================================================
//
// REST candlesticks are positional arrays of string-encoded numbers:
//   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] closeTime,
//   [6] baseVolume, [7] quoteVolume, [8] tradeCount,
//   [9] takerBuyBaseVolume, [10] takerBuyQuoteVolume
//
// Live ticker frames carry a JSON-encoded array of rows in their "o" field:
//   [0] openTime, [1] high, [2] low, [3] open, [4] close, [5] volume, ...
// Live rows have no quote volume, trade count or taker volumes; those are 0.
// =============================================================================

use serde_json::Value;

use crate::error::FeedError;
use crate::market_data::normalize::{field_f64, field_i64, field_u64, positional};
use crate::market_data::Candle;

pub const REST_ROW_FIELDS: usize = 11;
pub const LIVE_ROW_MIN_FIELDS: usize = 6;

/// `BTC-BRL` -> `btcbrl`, the form used in REST paths.
pub fn exchange_trading_pair(trading_pair: &str) -> String {
    trading_pair.replace('-', "").to_lowercase()
}

pub fn parse_rest_row(row: &Value) -> Result<Candle, FeedError> {
    let row = positional(row, REST_ROW_FIELDS)?;
    Ok(Candle {
        open_time: field_i64(row, 0, "openTime")?,
        open: field_f64(row, 1, "open")?,
        high: field_f64(row, 2, "high")?,
        low: field_f64(row, 3, "low")?,
        close: field_f64(row, 4, "close")?,
        base_volume: field_f64(row, 6, "baseVolume")?,
        quote_volume: field_f64(row, 7, "quoteVolume")?,
        trade_count: field_u64(row, 8, "tradeCount")?,
        taker_buy_base_volume: field_f64(row, 9, "takerBuyBaseVolume")?,
        taker_buy_quote_volume: field_f64(row, 10, "takerBuyQuoteVolume")?,
    })
}

/// Rows of a ticker frame. A frame without an `"o"` payload has no rows.
pub fn parse_live_frame(message: &str) -> Result<Vec<Value>, FeedError> {
    let root: Value = serde_json::from_str(message)
        .map_err(|e| FeedError::MalformedRecord(format!("live frame is not JSON: {e}")))?;

    let payload = match root.get("o") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(s)) => serde_json::from_str(s)
            .map_err(|e| FeedError::MalformedRecord(format!("live payload is not JSON: {e}")))?,
        Some(other) => other.clone(),
    };

    match payload {
        Value::Array(rows) => Ok(rows),
        other => Err(FeedError::MalformedRecord(format!(
            "live payload is not an array: {other}"
        ))),
    }
}

pub fn parse_live_row(row: &Value) -> Result<Candle, FeedError> {
    let row = positional(row, LIVE_ROW_MIN_FIELDS)?;
    Ok(Candle {
        open_time: field_i64(row, 0, "openTime")?,
        high: field_f64(row, 1, "high")?,
        low: field_f64(row, 2, "low")?,
        open: field_f64(row, 3, "open")?,
        close: field_f64(row, 4, "close")?,
        base_volume: field_f64(row, 5, "volume")?,
        quote_volume: 0.0,
        trade_count: 0,
        taker_buy_base_volume: 0.0,
        taker_buy_quote_volume: 0.0,
    })
}
