//! Sliding-window rate limiting with a minimum-interval debounce.

use crate::error::EngineError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-`(scope, client)` request history. Eviction, the window test, the
/// interval test, and the append happen atomically under that key's lock.
#[derive(Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<VecDeque<u64>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(
        &self,
        scope: &str,
        client: &str,
        max: u32,
        window_seconds: u64,
        interval_min_ms: u64,
    ) -> Result<(), EngineError> {
        self.check_at(scope, client, max, window_seconds, interval_min_ms, now_millis())
    }

    /// Clock-injectable variant used by tests and embedders with their own
    /// time source.
    pub fn check_at(
        &self,
        scope: &str,
        client: &str,
        max: u32,
        window_seconds: u64,
        interval_min_ms: u64,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let key = format!("{}:{}", scope, client);
        let bucket = self.buckets.entry(key).or_default();
        let mut history = bucket.lock();

        let horizon = now_ms.saturating_sub(window_seconds.saturating_mul(1000));
        while history.front().is_some_and(|t| *t < horizon) {
            history.pop_front();
        }

        if max > 0 && history.len() >= max as usize {
            return Err(EngineError::RateLimit(format!(
                "exceeded: {} requests in {}s",
                max, window_seconds
            )));
        }
        if interval_min_ms > 0 {
            if let Some(last) = history.back() {
                if now_ms.saturating_sub(*last) < interval_min_ms {
                    return Err(EngineError::RateLimit("interval too small".into()));
                }
            }
        }

        history.push_back(now_ms);
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
