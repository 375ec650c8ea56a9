// =============================================================================
// Candle Feed — one (trading pair, interval) series kept live and complete
// =============================================================================
//
// Lifecycle:
//   start()  installs a fresh buffer and spawns the listen loop on it
//   listen   resolve instrument id -> subscribe -> merge live rows
//   first live row seeds the buffer and spawns one backfill episode
//   stop()   cancels the loop and any backfill still in flight
//
// Every failure inside the loop is logged and retried after the configured
// retry interval; only cancellation ends it.
//
// Each run writes to its own buffer. Tasks of a stopped run may still be
// finishing a write when the next run starts; they only ever touch the
// buffer they were spawned with, which is no longer the feed's.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::backfill::BackfillController;
use super::cancel::{run_cancellable, sleep_or_cancel};
use super::candle_buffer::CandleBuffer;
use super::live_merge::LiveMerge;
use super::normalize::normalize_live;
use super::table::CandleTable;
use crate::error::FeedError;
use crate::exchange::{CandleSource, InstrumentId};
use crate::runtime_config::FeedConfig;

/// Handle to a running listen loop.
struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// State shared between the feed handle and its background tasks.
struct FeedShared<S: CandleSource> {
    name: String,
    source: Arc<S>,
    config: FeedConfig,
    retry_interval: Duration,
    instrument: OnceCell<InstrumentId>,
}

pub struct CandleFeed<S: CandleSource> {
    shared: Arc<FeedShared<S>>,
    /// Buffer of the current (or most recent) run.
    buffer: RwLock<Arc<CandleBuffer>>,
    run: Mutex<Option<ActiveRun>>,
}

impl<S: CandleSource> CandleFeed<S> {
    pub fn new(source: Arc<S>, config: FeedConfig, retry_interval: Duration) -> Self {
        let name = format!("{}_{}", source.name(), config.trading_pair());
        let buffer = Arc::new(CandleBuffer::new(config.max_records()));
        Self {
            shared: Arc::new(FeedShared {
                name,
                source,
                config,
                retry_interval,
                instrument: OnceCell::new(),
            }),
            buffer: RwLock::new(buffer),
            run: Mutex::new(None),
        }
    }

    /// `"<exchange>_<trading pair>"`.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }

    pub fn buffer(&self) -> Arc<CandleBuffer> {
        self.buffer.read().clone()
    }

    /// Begin maintaining the series. Calling `start` on a running feed does
    /// nothing. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut run = self.run.lock();
        if let Some(active) = run.as_ref() {
            if !active.handle.is_finished() {
                debug!(feed = %self.shared.name, "feed already running");
                return;
            }
        }

        let buffer = Arc::new(CandleBuffer::new(self.shared.config.max_records()));
        *self.buffer.write() = buffer.clone();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listen_loop(self.shared.clone(), buffer, cancel.clone()));
        *run = Some(ActiveRun { cancel, handle });

        info!(
            feed = %self.shared.name,
            interval = %self.shared.config.interval(),
            max_records = self.shared.config.max_records(),
            "candle feed started"
        );
    }

    /// Cancel the listen loop and any in-flight backfill. The buffer stays
    /// readable until the next `start` replaces it.
    pub fn stop(&self) {
        if let Some(active) = self.run.lock().take() {
            active.cancel.cancel();
            info!(feed = %self.shared.name, "candle feed stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// True once the buffer holds `max_records` candles.
    pub fn ready(&self) -> bool {
        self.buffer.read().is_full()
    }

    pub fn missing_records(&self) -> usize {
        self.buffer.read().remaining_capacity()
    }

    pub fn snapshot_as_table(&self) -> CandleTable {
        CandleTable::from(self.buffer.read().snapshot())
    }

    pub async fn health_check(&self) -> Result<(), FeedError> {
        self.shared.source.health_check().await
    }
}

impl<S: CandleSource> Drop for CandleFeed<S> {
    fn drop(&mut self) {
        if let Some(active) = self.run.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

impl<S: CandleSource> std::fmt::Debug for CandleFeed<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleFeed")
            .field("name", &self.shared.name)
            .field("interval", &self.shared.config.interval())
            .field("buffer", &*self.buffer.read())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Listen loop
// ---------------------------------------------------------------------------

async fn listen_loop<S: CandleSource>(
    shared: Arc<FeedShared<S>>,
    buffer: Arc<CandleBuffer>,
    cancel: CancellationToken,
) {
    let mut merge = LiveMerge::new(buffer);

    loop {
        match shared.listen_once(&mut merge, &cancel).await {
            Ok(()) => warn!(feed = %shared.name, "live candle stream ended, resubscribing"),
            Err(e) if e.is_cancelled() => break,
            Err(e) => error!(
                feed = %shared.name,
                error = %e,
                retry_in_ms = shared.retry_interval.as_millis() as u64,
                "unexpected error occurred when listening to public klines, retrying"
            ),
        }
        if sleep_or_cancel(&cancel, shared.retry_interval).await.is_err() {
            break;
        }
    }

    debug!(feed = %shared.name, "listen loop exited");
}

impl<S: CandleSource> FeedShared<S> {
    /// One subscription: returns `Ok` when the stream ends cleanly.
    #[instrument(skip(self, merge, cancel), fields(feed = %self.name), name = "feed::listen_once")]
    async fn listen_once(&self, merge: &mut LiveMerge, cancel: &CancellationToken) -> Result<(), FeedError> {
        let instrument = self.instrument_id(cancel).await?;
        let subscribe = self.source.subscribe(instrument, self.config.interval());
        let mut stream = run_cancellable(cancel, subscribe).await?;
        info!(feed = %self.name, %instrument, "subscribed to public klines");

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FeedError::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(message)) => self.on_message(merge, &message, cancel),
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            }
        }
    }

    fn on_message(&self, merge: &mut LiveMerge, message: &str, cancel: &CancellationToken) {
        let candles = normalize_live(&*self.source, message);
        if candles.is_empty() {
            return;
        }
        let summary = merge.apply(candles);
        debug!(
            feed = %self.name,
            appended = summary.appended,
            replaced = summary.replaced,
            ignored = summary.ignored,
            "live rows merged"
        );
        if summary.start_backfill {
            self.spawn_backfill(merge.buffer().clone(), cancel.child_token());
        }
    }

    /// Cached instrument id, resolved on first use. Transport failures are
    /// retried; an unknown pair is returned to the loop.
    async fn instrument_id(&self, cancel: &CancellationToken) -> Result<InstrumentId, FeedError> {
        if let Some(id) = self.instrument.get() {
            return Ok(*id);
        }
        let pair = self.config.trading_pair();
        loop {
            match run_cancellable(cancel, self.source.resolve_instrument_id(pair)).await {
                Ok(id) => {
                    let _ = self.instrument.set(id);
                    info!(feed = %self.name, trading_pair = pair, %id, "instrument id resolved");
                    return Ok(id);
                }
                Err(e) if e.is_retryable() => {
                    warn!(feed = %self.name, error = %e, "instrument lookup failed, retrying");
                    sleep_or_cancel(cancel, self.retry_interval).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn spawn_backfill(&self, buffer: Arc<CandleBuffer>, cancel: CancellationToken) {
        let controller = BackfillController::new(
            self.source.clone(),
            buffer,
            self.config.clone(),
            self.retry_interval,
            self.name.clone(),
        );
        let name = self.name.clone();
        tokio::spawn(async move {
            match controller.run(&cancel).await {
                Ok(report) => debug!(feed = %name, ?report, "backfill finished"),
                Err(e) if e.is_cancelled() => debug!(feed = %name, "backfill cancelled"),
                Err(e) => error!(
                    feed = %name,
                    error = %e,
                    "historical backfill stopped, feed stays not ready"
                ),
            }
        });
    }
}
