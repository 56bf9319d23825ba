//! Global spacing between outbound lookups
//!
//! One limiter is shared by every resolver kind. A grant records its time;
//! the next grant is only possible `min_interval` later.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a non-blocking acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// Slot granted, dispatch now
    Proceed,
    /// Too soon; retry after this long
    Wait(Duration),
}

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_grant: Mutex<Option<Instant>>,
    /// Waiters line up here so grants follow call order
    queue: tokio::sync::Mutex<()>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_grant: Mutex::new(None),
            queue: tokio::sync::Mutex::new(()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Try to take the slot without waiting.
    pub fn try_acquire(&self) -> Acquire {
        let now = Instant::now();
        let mut last_grant = self.last_grant.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(last) = *last_grant {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Acquire::Wait(self.min_interval - elapsed);
            }
        }

        *last_grant = Some(now);
        Acquire::Proceed
    }

    /// Wait until the slot is granted. Concurrent callers are served in the
    /// order they called.
    pub async fn acquire(&self) {
        let _turn = self.queue.lock().await;
        while let Acquire::Wait(delay) = self.try_acquire() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_grant_is_immediate() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.try_acquire(), Acquire::Proceed);
        assert_eq!(
            limiter.try_acquire(),
            Acquire::Wait(DEFAULT_MIN_INTERVAL)
        );

        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(
            limiter.try_acquire(),
            Acquire::Wait(Duration::from_millis(60))
        );

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(limiter.try_acquire(), Acquire::Proceed);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_spaced_in_call_order() {
        let limiter = Arc::new(RateLimiter::default());
        let start = Instant::now();

        let grants = join_all((0..5).map(|i| {
            let limiter = Arc::clone(&limiter);
            async move {
                limiter.acquire().await;
                (i, Instant::now())
            }
        }))
        .await;

        let mut by_time = grants.clone();
        by_time.sort_by_key(|(_, at)| *at);
        let order: Vec<usize> = by_time.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        for pair in by_time.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= DEFAULT_MIN_INTERVAL);
        }
        assert_eq!(by_time[0].1, start);
    }
}
