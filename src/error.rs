//! Error taxonomy for the candle feed.
//!
//! Transient exchange failures (`Fetch`, `Subscribe`) are retried inside the
//! feed and never reach the caller. `Cancelled` is propagated through every
//! layer untouched.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("fetch from {endpoint} failed: {message}")]
    Fetch { endpoint: String, message: String },

    #[error("unknown trading pair: {trading_pair}")]
    Lookup { trading_pair: String },

    #[error("live subscription failed: {0}")]
    Subscribe(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error(
        "insufficient historical data for {feed}: {requests} requests executed, {missing} records still missing"
    )]
    BackfillBudgetExhausted {
        feed: String,
        requests: usize,
        missing: usize,
    },

    #[error("invalid instrument map: {0}")]
    InvalidInstrumentMap(String),

    #[error("unsupported interval: {0}")]
    UnsupportedInterval(String),

    #[error("invalid feed config: {0}")]
    InvalidConfig(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl FeedError {
    pub fn fetch(endpoint: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Fetch {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Transient failures that the retry loops absorb.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Subscribe(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
