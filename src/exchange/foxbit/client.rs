// =============================================================================
// Foxbit REST API Client — public market-data endpoints
// =============================================================================
//
// Only unauthenticated endpoints are used: candlesticks, instruments and the
// server clock. Every request passes through the per-endpoint throttle before
// it is sent. Transport failures, non-2xx statuses and undecodable bodies all
// surface as `FeedError::Fetch` so the caller can retry them.
// =============================================================================

use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, instrument};

use super::rate_limit::{RateLimit, Throttle};
use super::{
    CANDLES_ENDPOINT, HEALTH_CHECK_ENDPOINT, INSTRUMENTS_ENDPOINT, MAX_RESULTS_PER_REQUEST,
};
use crate::error::FeedError;
use crate::runtime_config::ExchangeConfig;
use crate::types::Interval;

const RATE_LIMITS: [RateLimit; 3] = [
    RateLimit {
        limit_id: CANDLES_ENDPOINT,
        limit: 3,
        window: Duration::from_secs(2),
    },
    RateLimit {
        limit_id: HEALTH_CHECK_ENDPOINT,
        limit: 5,
        window: Duration::from_secs(1),
    },
    RateLimit {
        limit_id: INSTRUMENTS_ENDPOINT,
        limit: 750,
        window: Duration::from_secs(60),
    },
];

/// Foxbit REST client for the public market-data API.
pub struct FoxbitClient {
    rest_url: String,
    rest_v2_url: String,
    client: reqwest::Client,
    throttle: Throttle,
}

impl FoxbitClient {
    pub fn new(exchange: &ExchangeConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        debug!(rest_url = %exchange.rest_url, "FoxbitClient initialised");

        Ok(Self {
            rest_url: exchange.rest_url.trim_end_matches('/').to_string(),
            rest_v2_url: exchange.rest_v2_url.trim_end_matches('/').to_string(),
            client,
            throttle: Throttle::new(&RATE_LIMITS),
        })
    }

    /// URL of the candlesticks endpoint for an exchange-format pair
    /// (`btcbrl`).
    pub fn candles_url(&self, exchange_pair: &str) -> String {
        format!(
            "{}{}",
            self.rest_url,
            CANDLES_ENDPOINT.replace("{}", exchange_pair)
        )
    }

    pub fn instruments_url(&self) -> String {
        format!("{}{}", self.rest_v2_url, INSTRUMENTS_ENDPOINT)
    }

    pub fn health_check_url(&self) -> String {
        format!("{}{}", self.rest_url, HEALTH_CHECK_ENDPOINT)
    }

    /// GET /markets/{pair}/candlesticks.
    ///
    /// Returns the raw positional rows, oldest first. `limit` is capped at
    /// [`MAX_RESULTS_PER_REQUEST`].
    #[instrument(skip(self), name = "foxbit::get_candlesticks")]
    pub async fn get_candlesticks(
        &self,
        exchange_pair: &str,
        interval: Interval,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Value>, FeedError> {
        let mut query = vec![
            ("interval", interval.label().to_string()),
            ("limit", limit.min(MAX_RESULTS_PER_REQUEST).to_string()),
        ];
        if let Some(end) = end_time {
            query.push(("end_time", end.to_string()));
        }

        let url = self.candles_url(exchange_pair);
        let body = self.get_json(CANDLES_ENDPOINT, &url, &query).await?;

        let rows = match body {
            Value::Array(rows) => rows,
            other => {
                return Err(FeedError::fetch(
                    CANDLES_ENDPOINT,
                    format!("candlesticks response is not an array: {other}"),
                ))
            }
        };

        debug!(exchange_pair, %interval, count = rows.len(), "candlesticks fetched");
        Ok(rows)
    }

    /// GET /AP/GetInstruments.
    #[instrument(skip(self), name = "foxbit::get_instruments")]
    pub async fn get_instruments(&self) -> Result<Value, FeedError> {
        let url = self.instruments_url();
        self.get_json(INSTRUMENTS_ENDPOINT, &url, &[]).await
    }

    /// GET /system/time.
    #[instrument(skip(self), name = "foxbit::get_system_time")]
    pub async fn get_system_time(&self) -> Result<Value, FeedError> {
        let url = self.health_check_url();
        self.get_json(HEALTH_CHECK_ENDPOINT, &url, &[]).await
    }

    async fn get_json(
        &self,
        limit_id: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FeedError> {
        self.throttle.acquire(limit_id).await;

        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FeedError::fetch(limit_id, format!("GET {url} request failed: {e}")))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| FeedError::fetch(limit_id, format!("failed to parse response: {e}")))?;

        if !status.is_success() {
            return Err(FeedError::fetch(
                limit_id,
                format!("GET {url} returned {status}: {body}"),
            ));
        }

        Ok(body)
    }
}

impl std::fmt::Debug for FoxbitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoxbitClient")
            .field("rest_url", &self.rest_url)
            .field("rest_v2_url", &self.rest_v2_url)
            .field("throttle", &self.throttle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FoxbitClient {
        FoxbitClient::new(&ExchangeConfig::default(), Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn endpoint_urls() {
        let c = client();
        assert_eq!(
            c.candles_url("btcusdt"),
            "https://api.foxbit.com.br/rest/v3/markets/btcusdt/candlesticks"
        );
        assert_eq!(c.instruments_url(), "https://api.foxbit.com.br/AP/GetInstruments");
        assert_eq!(c.health_check_url(), "https://api.foxbit.com.br/rest/v3/system/time");
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        let exchange = ExchangeConfig {
            rest_url: "http://localhost:8080/rest/v3/".into(),
            ..ExchangeConfig::default()
        };
        let c = FoxbitClient::new(&exchange, Duration::from_secs(1)).unwrap();
        assert_eq!(c.health_check_url(), "http://localhost:8080/rest/v3/system/time");
    }
}
