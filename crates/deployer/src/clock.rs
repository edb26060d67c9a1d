//! Time source used by every blocking wait in a deployment run.
//!
//! Production code sleeps on the tokio timer. Tests substitute a manual
//! clock that advances instantly and records each requested sleep, so backoff
//! schedules can be asserted without waiting.

use async_trait::async_trait;
use std::time::{Duration, Instant};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;

    #[tokio::test]
    async fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let before = clock.now();

        clock.sleep(Duration::from_secs(5)).await;
        clock.sleep(Duration::from_secs(10)).await;

        assert_eq!(clock.now() - before, Duration::from_secs(15));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
    }

    #[test]
    fn manual_advance_is_not_recorded_as_sleep() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
        assert!(clock.sleeps().is_empty());
    }
}
