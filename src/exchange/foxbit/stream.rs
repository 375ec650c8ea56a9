// =============================================================================
// Foxbit ticker WebSocket — live candle subscription
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::WS_CANDLES_ENDPOINT;
use crate::error::FeedError;
use crate::exchange::{InstrumentId, LiveStream};
use crate::types::Interval;

/// Message-frame sequence numbers for outgoing requests on one source.
/// The first frame carries `1`.
#[derive(Debug, Default)]
pub struct FrameSequence(AtomicU64);

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Request frame for the `SubscribeTicker` channel.
///
/// Foxbit frames wrap the request body as a JSON *string* in `"o"`.
pub fn subscription_frame(sequence: u64, instrument: InstrumentId, interval: Interval) -> Value {
    let body = json!({
        "OMSId": 1,
        "InstrumentId": instrument.0,
        "Interval": interval.seconds(),
        "IncludeLastCount": 1,
    });
    json!({
        "Content-Type": "application/json",
        "User-Agent": "candle-feed",
        "m": 2,
        "i": sequence,
        "n": WS_CANDLES_ENDPOINT,
        "o": body.to_string(),
    })
}

/// Connect to `url`, send `frame`, and yield every text frame received.
///
/// Non-text frames are skipped (tungstenite answers pings itself). A read
/// error ends the stream with `FeedError::Subscribe`; a close frame ends it
/// cleanly.
pub async fn open_ticker_stream(url: &str, frame: Value) -> Result<LiveStream, FeedError> {
    info!(url = %url, "connecting to ticker WebSocket");

    let (mut ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| FeedError::Subscribe(format!("failed to connect to {url}: {e}")))?;

    ws_stream
        .send(Message::Text(frame.to_string()))
        .await
        .map_err(|e| FeedError::Subscribe(format!("failed to send subscription: {e}")))?;

    info!(url = %url, "subscribed to public candles");

    let stream = ws_stream
        .take_while(|msg| {
            let open = !matches!(msg, Ok(Message::Close(_)));
            if !open {
                warn!("ticker WebSocket closed by server");
            }
            futures_util::future::ready(open)
        })
        .filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => {
                    debug!("ignoring non-text frame");
                    None
                }
                Err(e) => Some(Err(FeedError::Subscribe(format!("ticker read error: {e}")))),
            }
        });

    Ok(stream.boxed())
}
