//! Record normalization: raw exchange rows into [`Candle`]s.
//!
//! The row layouts belong to each [`CandleSource`]; this module holds the
//! numeric field parsers they share and the batch-level policy of dropping
//! malformed rows without aborting the rest.

use serde_json::Value;
use tracing::warn;

use super::candle_buffer::Candle;
use crate::error::FeedError;
use crate::exchange::CandleSource;

/// Field `idx` of a positional row as a finite `f64`. Exchanges send numbers
/// either as JSON strings or as JSON numbers.
pub fn field_f64(row: &[Value], idx: usize, name: &str) -> Result<f64, FeedError> {
    let value = match row.get(idx) {
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| FeedError::MalformedRecord(format!("{name} '{s}': {e}")))?,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| FeedError::MalformedRecord(format!("{name} is not a valid f64")))?,
        Some(other) => {
            return Err(FeedError::MalformedRecord(format!(
                "{name} has unexpected JSON type: {other}"
            )))
        }
        None => return Err(FeedError::MalformedRecord(format!("missing field {name}"))),
    };
    if !value.is_finite() {
        return Err(FeedError::MalformedRecord(format!("{name} is not finite: {value}")));
    }
    Ok(value)
}

/// Field `idx` as an integer. Accepts `"1672981200000"`, `1672981200000`
/// and whole-valued float encodings such as `1672981200000.0`.
pub fn field_i64(row: &[Value], idx: usize, name: &str) -> Result<i64, FeedError> {
    match row.get(idx) {
        Some(Value::String(s)) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    let f = s.parse::<f64>().map_err(|e| {
                        FeedError::MalformedRecord(format!("{name} '{s}': {e}"))
                    })?;
                    whole_f64_to_i64(f, name)
                }
            }
        }
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => Ok(v),
            None => {
                let f = n.as_f64().ok_or_else(|| {
                    FeedError::MalformedRecord(format!("{name} is not an integer"))
                })?;
                whole_f64_to_i64(f, name)
            }
        },
        Some(other) => Err(FeedError::MalformedRecord(format!(
            "{name} has unexpected JSON type: {other}"
        ))),
        None => Err(FeedError::MalformedRecord(format!("missing field {name}"))),
    }
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn whole_f64_to_i64(f: f64, name: &str) -> Result<i64, FeedError> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if !f.is_finite() || f.fract() != 0.0 || f < -LIMIT || f >= LIMIT {
        return Err(FeedError::MalformedRecord(format!("{name} is not a whole number: {f}")));
    }
    Ok(f as i64)
}

pub fn field_u64(row: &[Value], idx: usize, name: &str) -> Result<u64, FeedError> {
    let value = field_i64(row, idx, name)?;
    u64::try_from(value).map_err(|_| FeedError::MalformedRecord(format!("{name} is negative")))
}

/// View `row` as a positional array with at least `min_fields` entries.
pub fn positional(row: &Value, min_fields: usize) -> Result<&[Value], FeedError> {
    let arr = row
        .as_array()
        .ok_or_else(|| FeedError::MalformedRecord(format!("row is not an array: {row}")))?;
    if arr.len() < min_fields {
        return Err(FeedError::MalformedRecord(format!(
            "row has {} fields, expected at least {min_fields}",
            arr.len()
        )));
    }
    Ok(arr)
}

/// Normalize a historical batch, keeping the source order and dropping rows
/// that fail to parse.
pub fn normalize_historical<S: CandleSource + ?Sized>(source: &S, rows: &[Value]) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        match source.parse_historical_row(row) {
            Ok(candle) => candles.push(candle),
            Err(e) => warn!(source = source.name(), error = %e, "skipping malformed historical row"),
        }
    }
    candles
}

/// Normalize one live message into its rows. Unparsable messages and rows
/// yield nothing.
pub fn normalize_live<S: CandleSource + ?Sized>(source: &S, message: &str) -> Vec<Candle> {
    let rows = match source.live_rows(message) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(source = source.name(), error = %e, "ignoring malformed live message");
            return Vec::new();
        }
    };

    let mut candles = Vec::with_capacity(rows.len());
    for row in &rows {
        match source.parse_live_row(row) {
            Ok(candle) => candles.push(candle),
            Err(e) => warn!(source = source.name(), error = %e, "skipping malformed live row"),
        }
    }
    candles
}
