//! Outbound request pacing
//!
//! This module handles:
//! - Spacing consecutive requests by a delay drawn uniformly from a range
//! - Counting requests against an optional per-run quota
//!
//! Slots are granted one at a time through an async mutex, so concurrent
//! fetch futures queue up behind each other instead of racing.

use crate::config::RateLimitConfig;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// The request quota for this run has been used up
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Daily quota of {quota} requests exhausted")]
pub struct QuotaExceeded {
    pub quota: u64,
}

/// Bookkeeping for granted slots
#[derive(Debug, Default)]
struct LimiterState {
    /// Slots granted so far
    request_count: u64,

    /// When the previous slot was granted
    last_request_time: Option<Instant>,

    /// Gap required after the previous slot, drawn when it was granted
    next_gap: Duration,
}

impl LimiterState {
    /// Time left before another slot may be granted, if any
    fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let ready_at = last + self.next_gap;
        if now >= ready_at {
            None
        } else {
            Some(ready_at - now)
        }
    }
}

/// Paces outbound requests for one collector run
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    daily_quota: Option<u64>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration, daily_quota: Option<u64>) -> Self {
        // Keep the range well formed even if the caller swapped the bounds
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };

        Self {
            min_delay,
            max_delay,
            daily_quota,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        let (min, max) = config.delay_range();
        Self::new(min, max, config.daily_quota)
    }

    /// A limiter that never waits and never runs out
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, None)
    }

    /// Waits until an outbound request may be made and claims the slot
    ///
    /// Returns `QuotaExceeded` without waiting once the quota is used up.
    pub async fn wait_for_slot(&self) -> Result<(), QuotaExceeded> {
        let mut state = self.state.lock().await;

        if let Some(quota) = self.daily_quota {
            if state.request_count >= quota {
                return Err(QuotaExceeded { quota });
            }
        }

        if let Some(wait) = state.time_until_next_request(Instant::now()) {
            tracing::trace!("Rate limiter sleeping {:?}", wait);
            tokio::time::sleep(wait).await;
        }

        state.request_count += 1;
        state.last_request_time = Some(Instant::now());
        state.next_gap = self.draw_gap();
        Ok(())
    }

    /// Slots granted so far
    pub async fn requests_made(&self) -> u64 {
        self.state.lock().await.request_count
    }

    /// Slots left before the quota trips, `None` when unlimited
    pub async fn remaining(&self) -> Option<u64> {
        let used = self.requests_made().await;
        self.daily_quota.map(|quota| quota.saturating_sub(used))
    }

    fn draw_gap(&self) -> Duration {
        if self.min_delay == self.max_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }
}
