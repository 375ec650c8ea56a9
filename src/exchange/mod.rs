//! Exchange capability interface consumed by the candle feed.

pub mod foxbit;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FeedError;
use crate::market_data::Candle;
use crate::types::Interval;

/// Exchange-side numeric instrument identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId(pub u64);

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw live messages as delivered by the exchange socket. The stream never
/// ends on its own while the connection is healthy.
pub type LiveStream = BoxStream<'static, Result<String, FeedError>>;

/// What the feed needs from an exchange: historical rows, a live stream, the
/// pair to instrument-id lookup, and the row layouts to normalize both.
#[async_trait]
pub trait CandleSource: Send + Sync + 'static {
    /// Short exchange name, used to label feeds in logs.
    fn name(&self) -> &str;

    /// Largest `limit` a single historical request may ask for.
    fn historical_page_size(&self) -> usize;

    /// Raw rows for `trading_pair` ordered oldest first, ending at
    /// `end_time` when given.
    async fn fetch_historical(
        &self,
        trading_pair: &str,
        interval: Interval,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Value>, FeedError>;

    async fn resolve_instrument_id(&self, trading_pair: &str) -> Result<InstrumentId, FeedError>;

    async fn subscribe(
        &self,
        instrument: InstrumentId,
        interval: Interval,
    ) -> Result<LiveStream, FeedError>;

    async fn health_check(&self) -> Result<(), FeedError>;

    fn parse_historical_row(&self, row: &Value) -> Result<Candle, FeedError>;

    /// Split one live message into its raw rows.
    fn live_rows(&self, message: &str) -> Result<Vec<Value>, FeedError>;

    fn parse_live_row(&self, row: &Value) -> Result<Candle, FeedError>;
}
