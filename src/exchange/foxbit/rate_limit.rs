// =============================================================================
// Request Throttle — keeps Foxbit public endpoints under their rate limits
// =============================================================================
//
// Foxbit limits per endpoint:
//   - candlesticks:   3 requests every 2 s
//   - system/time:    5 requests every 1 s
//   - GetInstruments: 750 requests every 60 s
//
// Each endpoint keeps a sliding window of recent request instants. A caller
// that finds the window full sleeps until the oldest entry expires. The lock
// is released before sleeping.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Limit for one endpoint: at most `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit_id: &'static str,
    pub limit: usize,
    pub window: Duration,
}

struct Window {
    rule: RateLimit,
    sent: VecDeque<Instant>,
}

pub struct Throttle {
    windows: Mutex<HashMap<&'static str, Window>>,
}

impl Throttle {
    pub fn new(limits: &[RateLimit]) -> Self {
        let windows = limits
            .iter()
            .map(|rule| {
                (
                    rule.limit_id,
                    Window {
                        rule: *rule,
                        sent: VecDeque::with_capacity(rule.limit),
                    },
                )
            })
            .collect();
        Self {
            windows: Mutex::new(windows),
        }
    }

    /// Wait until a request to `limit_id` fits its window, then record it.
    /// Unknown ids are not throttled.
    pub async fn acquire(&self, limit_id: &str) {
        loop {
            let wait = {
                let mut windows = self.windows.lock();
                let Some(window) = windows.get_mut(limit_id) else {
                    return;
                };
                let now = Instant::now();
                while window
                    .sent
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= window.rule.window)
                {
                    window.sent.pop_front();
                }
                if window.sent.len() < window.rule.limit {
                    window.sent.push_back(now);
                    return;
                }
                window
                    .sent
                    .front()
                    .map(|oldest| window.rule.window.saturating_sub(now.duration_since(*oldest)))
                    .unwrap_or_default()
            };
            debug!(limit_id, wait_ms = wait.as_millis() as u64, "throttling request");
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests recorded in the current window of `limit_id`.
    #[cfg(test)]
    pub fn in_flight(&self, limit_id: &str) -> usize {
        let mut windows = self.windows.lock();
        let Some(window) = windows.get_mut(limit_id) else {
            return 0;
        };
        let now = Instant::now();
        let span = window.rule.window;
        window.sent.retain(|t| now.duration_since(*t) < span);
        window.sent.len()
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let windows = self.windows.lock();
        let mut dbg = f.debug_struct("Throttle");
        for (id, window) in windows.iter() {
            dbg.field(id, &window.sent.len());
        }
        dbg.finish()
    }
}
