// =============================================================================
// Candle Feed — Main Entry Point
// =============================================================================
//
// Starts one feed per configured (pair, interval), reports progress every
// second, prints the tail of each table once every feed is ready, and stops.
// Ctrl+C stops early.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use candle_feed::{CandleFeed, CandleSource, CandleTable, FoxbitSource, RuntimeConfig};

const DEFAULT_CONFIG_PATH: &str = "candle_feed.json";
const TAIL_ROWS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Foxbit Candle Feed — Starting Up                  ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let path = std::env::var("CANDLES_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = RuntimeConfig::load(&path)
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            RuntimeConfig::default()
        })
        .with_env_overrides()?;

    let feed_configs = config.feed_configs()?;
    info!(
        trading_pairs = ?config.trading_pairs,
        intervals = ?config.intervals,
        max_records = config.max_records,
        "Configured candle feeds"
    );

    // ── 2. Exchange source ───────────────────────────────────────────────
    let source = Arc::new(FoxbitSource::new(&config.exchange, config.request_timeout())?);
    match source.health_check().await {
        Ok(()) => info!("Foxbit REST API reachable"),
        Err(e) => warn!(error = %e, "Foxbit health check failed, starting feeds anyway"),
    }

    // ── 3. Start feeds ───────────────────────────────────────────────────
    let mut feeds = Vec::with_capacity(feed_configs.len());
    for feed_config in feed_configs {
        let feed = CandleFeed::new(source.clone(), feed_config, config.retry_interval());
        feed.start();
        feeds.push(feed);
        tokio::time::sleep(config.feed_start_delay()).await;
    }

    // ── 4. Wait for every feed to fill ───────────────────────────────────
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Shutdown signal received, stopping feeds");
                break;
            }
            _ = ticker.tick() => {
                if feeds.iter().all(|f| f.ready()) {
                    for feed in &feeds {
                        log_table_tail(feed.name(), &feed.config().interval().to_string(), &feed.snapshot_as_table());
                    }
                    break;
                }
                for feed in feeds.iter().filter(|f| !f.ready()) {
                    info!(
                        feed = %feed.name(),
                        interval = %feed.config().interval(),
                        missing = feed.missing_records(),
                        running = feed.is_running(),
                        "Waiting for candles"
                    );
                }
            }
        }
    }

    // ── 5. Shutdown ──────────────────────────────────────────────────────
    for feed in &feeds {
        feed.stop();
    }
    info!("Candle feed shut down complete.");
    Ok(())
}

fn log_table_tail(feed: &str, interval: &str, table: &CandleTable) {
    info!(feed, interval, rows = table.len(), "Candle table ready");
    let skip = table.len().saturating_sub(TAIL_ROWS);
    for candle in &table.rows()[skip..] {
        let Some(open) = Utc.timestamp_millis_opt(candle.open_time).single() else {
            error!(feed, open_time = candle.open_time, "open time out of range");
            continue;
        };
        info!(
            feed,
            interval,
            open_time = %open.format("%Y-%m-%d %H:%M:%S"),
            open = candle.open,
            high = candle.high,
            low = candle.low,
            close = candle.close,
            volume = candle.base_volume,
            n_trades = candle.trade_count,
            "candle"
        );
    }
}
