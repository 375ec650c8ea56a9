//! In-memory [`CandleSource`] for feed and backfill tests.
//!
//! Historical responses and subscriptions are scripted up front and consumed
//! in order; once a script runs dry, fetches return empty pages and
//! subscriptions stay open without producing messages.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::candle_buffer::Candle;
use crate::error::FeedError;
use crate::exchange::foxbit::parse;
use crate::exchange::{CandleSource, InstrumentId, LiveStream};
use crate::types::Interval;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub trading_pair: String,
    pub interval: Interval,
    pub end_time: Option<i64>,
    pub limit: usize,
}

type FetchHook = Box<dyn FnOnce() + Send>;

pub struct ScriptedSource {
    page_size: usize,
    fetch_hook: Mutex<Option<FetchHook>>,
    instruments: HashMap<String, InstrumentId>,
    historical: Mutex<VecDeque<Result<Vec<Value>, FeedError>>>,
    fetches: Mutex<Vec<FetchCall>>,
    subscriptions: Mutex<VecDeque<Result<Vec<String>, FeedError>>>,
    subscribe_calls: AtomicUsize,
    resolve_failures: AtomicUsize,
    resolve_calls: AtomicUsize,
    health: Mutex<Result<(), FeedError>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::with_page_size(500)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let instruments = [("BTC-USDT".to_string(), InstrumentId(13))].into_iter().collect();
        Self {
            page_size,
            fetch_hook: Mutex::new(None),
            instruments,
            historical: Mutex::new(VecDeque::new()),
            fetches: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(VecDeque::new()),
            subscribe_calls: AtomicUsize::new(0),
            resolve_failures: AtomicUsize::new(0),
            resolve_calls: AtomicUsize::new(0),
            health: Mutex::new(Ok(())),
        }
    }

    pub fn push_historical(&self, response: Result<Vec<Value>, FeedError>) {
        self.historical.lock().push_back(response);
    }

    /// Script the next subscription: an error, or the messages it delivers
    /// before going quiet.
    pub fn push_subscription(&self, messages: Result<Vec<String>, FeedError>) {
        self.subscriptions.lock().push_back(messages);
    }

    /// Run `hook` inside the next historical fetch, while the request is in
    /// flight.
    pub fn on_next_fetch(&self, hook: impl FnOnce() + Send + 'static) {
        *self.fetch_hook.lock() = Some(Box::new(hook));
    }

    /// Make the next `n` instrument lookups fail with a retryable error.
    pub fn fail_resolves(&self, n: usize) {
        self.resolve_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_health(&self, result: Result<(), FeedError>) {
        *self.health.lock() = result;
    }

    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.fetches.lock().clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandleSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn historical_page_size(&self) -> usize {
        self.page_size
    }

    async fn fetch_historical(
        &self,
        trading_pair: &str,
        interval: Interval,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Value>, FeedError> {
        self.fetches.lock().push(FetchCall {
            trading_pair: trading_pair.to_string(),
            interval,
            end_time,
            limit,
        });
        let hook = self.fetch_hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        self.historical.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn resolve_instrument_id(&self, trading_pair: &str) -> Result<InstrumentId, FeedError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .resolve_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FeedError::fetch("/GetInstruments", "service unavailable"));
        }
        self.instruments
            .get(trading_pair)
            .copied()
            .ok_or_else(|| FeedError::Lookup {
                trading_pair: trading_pair.to_string(),
            })
    }

    async fn subscribe(
        &self,
        _instrument: InstrumentId,
        _interval: Interval,
    ) -> Result<LiveStream, FeedError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.subscriptions.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()));
        let messages = script?;
        Ok(stream::iter(messages.into_iter().map(Ok))
            .chain(stream::pending())
            .boxed())
    }

    async fn health_check(&self) -> Result<(), FeedError> {
        self.health.lock().clone()
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

/// REST-shaped row with every price equal to `close`.
pub fn rest_row(open_time: i64, close: f64) -> Value {
    let price = close.to_string();
    json!([
        open_time.to_string(),
        price,
        price,
        price,
        price,
        (open_time + 59_999).to_string(),
        "1.5",
        "150.0",
        7,
        "0.5",
        "50.0"
    ])
}

/// Four consecutive hourly rows ending at 1672992000000.
pub fn sample_rest_rows() -> Vec<Value> {
    [1_672_981_200_000, 1_672_984_800_000, 1_672_988_400_000, 1_672_992_000_000]
        .into_iter()
        .map(|t| rest_row(t, 128_339.9999))
        .collect()
}

/// Ticker frame carrying one row per `(open_time, close)` pair.
pub fn live_frame(rows: &[(i64, f64)]) -> String {
    let rows: Vec<Value> = rows
        .iter()
        .map(|&(t, close)| json!([t, close, close, close, close, 24.861, 0, 2870.95, 1]))
        .collect();
    json!({ "m": 3, "n": "TickerDataUpdateEvent", "o": Value::Array(rows).to_string() }).to_string()
}

pub fn live_candle(open_time: i64, close: f64) -> Candle {
    Candle {
        open_time,
        open: close,
        high: close,
        low: close,
        close,
        base_volume: 1.0,
        quote_volume: 0.0,
        trade_count: 0,
        taker_buy_base_volume: 0.0,
        taker_buy_quote_volume: 0.0,
    }
}
