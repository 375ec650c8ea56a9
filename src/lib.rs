//! Candle feeds for the Foxbit spot market.
//!
//! A [`CandleFeed`] keeps the most recent `max_records` candles of one
//! trading pair and interval: live ticker updates at the newest end, REST
//! backfill at the oldest end.

pub mod error;
pub mod exchange;
pub mod market_data;
pub mod runtime_config;
pub mod types;

pub use error::FeedError;
pub use exchange::foxbit::FoxbitSource;
pub use exchange::{CandleSource, InstrumentId};
pub use market_data::{Candle, CandleFeed, CandleTable};
pub use runtime_config::{FeedConfig, RuntimeConfig};
pub use types::Interval;
