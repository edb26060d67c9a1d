//! Minimum-interval gate for publish triggers.
//!
//! One limiter is shared by every deployment run in the process. The last
//! trigger instant lives behind a single async mutex, and the lock is held
//! across the wait, the trigger call and the timestamp update, so two runs
//! can never both decide they are allowed in the same window.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;

pub struct RateLimiter {
    min_interval: Duration,
    last_trigger: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            last_trigger: Mutex::new(None),
            clock,
        }
    }

    /// Whether a trigger issued now would respect the minimum interval.
    pub async fn can_trigger(&self) -> bool {
        let last = self.last_trigger.lock().await;
        self.remaining(*last).is_zero()
    }

    /// Stamp "now" as the last trigger time.
    pub async fn record_trigger(&self) {
        let mut last = self.last_trigger.lock().await;
        *last = Some(self.clock.now());
    }

    /// Run `op` once the interval has elapsed, waiting if necessary.
    ///
    /// The trigger is recorded only when `op` succeeds. Callers queue on the
    /// lock in arrival order.
    pub async fn run_gated<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last = self.last_trigger.lock().await;

        let wait = self.remaining(*last);
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Waiting for trigger window");
            self.clock.sleep(wait).await;
        }

        let result = op().await;
        if result.is_ok() {
            *last = Some(self.clock.now());
        }
        result
    }

    fn remaining(&self, last: Option<Instant>) -> Duration {
        match last {
            None => Duration::ZERO,
            Some(at) => {
                let elapsed = self.clock.now().saturating_duration_since(at);
                self.min_interval.saturating_sub(elapsed)
            }
        }
    }
}
