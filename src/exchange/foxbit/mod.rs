//! Foxbit spot market implementation of [`CandleSource`].

pub mod client;
pub mod instruments;
pub mod parse;
pub mod rate_limit;
pub mod stream;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use self::client::FoxbitClient;
use self::instruments::InstrumentMap;
use self::stream::FrameSequence;
use crate::error::FeedError;
use crate::exchange::{CandleSource, InstrumentId, LiveStream};
use crate::market_data::Candle;
use crate::runtime_config::ExchangeConfig;
use crate::types::Interval;

pub const REST_URL: &str = "https://api.foxbit.com.br/rest/v3";
pub const REST_V2_URL: &str = "https://api.foxbit.com.br/AP";
pub const WSS_URL: &str = "wss://api.foxbit.com.br";

pub const HEALTH_CHECK_ENDPOINT: &str = "/system/time";
pub const CANDLES_ENDPOINT: &str = "/markets/{}/candlesticks";
pub const INSTRUMENTS_ENDPOINT: &str = "/GetInstruments";
pub const WS_CANDLES_ENDPOINT: &str = "SubscribeTicker";

/// Largest page the candlesticks endpoint returns.
pub const MAX_RESULTS_PER_REQUEST: usize = 500;

/// Foxbit candle source: REST backfill, ticker socket, and the lazily
/// loaded instrument map.
#[derive(Debug)]
pub struct FoxbitSource {
    client: FoxbitClient,
    wss_url: String,
    instruments: OnceCell<InstrumentMap>,
    sequence: FrameSequence,
}

impl FoxbitSource {
    pub fn new(exchange: &ExchangeConfig, request_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: FoxbitClient::new(exchange, request_timeout)?,
            wss_url: exchange.wss_url.clone(),
            instruments: OnceCell::new(),
            sequence: FrameSequence::new(),
        })
    }

    /// The instrument map, fetched on first use and cached afterwards.
    pub async fn instruments(&self) -> Result<&InstrumentMap, FeedError> {
        self.instruments
            .get_or_try_init(|| async {
                let body = self.client.get_instruments().await?;
                let map = InstrumentMap::from_instruments_response(&body)?;
                info!(count = map.len(), "instrument map loaded");
                Ok::<_, FeedError>(map)
            })
            .await
    }
}

#[async_trait]
impl CandleSource for FoxbitSource {
    fn name(&self) -> &str {
        "foxbit"
    }

    fn historical_page_size(&self) -> usize {
        MAX_RESULTS_PER_REQUEST
    }

    async fn fetch_historical(
        &self,
        trading_pair: &str,
        interval: Interval,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Value>, FeedError> {
        let exchange_pair = parse::exchange_trading_pair(trading_pair);
        self.client
            .get_candlesticks(&exchange_pair, interval, end_time, limit)
            .await
    }

    async fn resolve_instrument_id(&self, trading_pair: &str) -> Result<InstrumentId, FeedError> {
        self.instruments()
            .await?
            .instrument_id(trading_pair)
            .ok_or_else(|| FeedError::Lookup {
                trading_pair: trading_pair.to_string(),
            })
    }

    async fn subscribe(
        &self,
        instrument: InstrumentId,
        interval: Interval,
    ) -> Result<LiveStream, FeedError> {
        let frame = stream::subscription_frame(self.sequence.next(), instrument, interval);
        stream::open_ticker_stream(&self.wss_url, frame).await
    }

    async fn health_check(&self) -> Result<(), FeedError> {
        match self.client.get_system_time().await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "foxbit health check failed");
                Err(e)
            }
        }
    }

    fn parse_historical_row(&self, row: &Value) -> Result<Candle, FeedError> {
        parse::parse_rest_row(row)
    }

    fn live_rows(&self, message: &str) -> Result<Vec<Value>, FeedError> {
        parse::parse_live_frame(message)
    }

    fn parse_live_row(&self, row: &Value) -> Result<Candle, FeedError> {
        parse::parse_live_row(row)
    }
}
