//! Per-source token bucket rate limiter
//!
//! Buckets refill lazily on each permission check; there is no background
//! task. Callers that are denied a permit ask [`RateLimiter::wait_time`] and
//! sleep before polling again.

use crate::types::{MetadataSource, RateLimitConfig};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Token bucket for a single source
///
/// Invariant: `0 <= tokens <= capacity`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: u32,
    capacity: u32,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Full bucket sized from `config`
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_size.max(1);
        Self {
            tokens: capacity,
            capacity,
            refill_rate: config.requests_per_second.max(f64::MIN_POSITIVE),
            last_refill: Instant::now(),
        }
    }

    /// Add `floor(elapsed * refill_rate)` whole tokens, capped at capacity.
    ///
    /// `last_refill` advances only by the time those whole tokens account for,
    /// so a caller polling faster than the refill rate still accumulates
    /// partial progress. A full bucket resets the clock to `now`.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let earned = (elapsed * self.refill_rate).floor();
        if earned < 1.0 {
            return;
        }

        let room = f64::from(self.capacity - self.tokens);
        if earned >= room {
            self.tokens = self.capacity;
            self.last_refill = now;
        } else {
            // earned < room <= capacity, so the cast is lossless
            self.tokens += earned as u32;
            self.last_refill += Duration::from_secs_f64(earned / self.refill_rate);
        }
    }

    /// Take one token if available
    pub fn try_acquire(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens >= 1 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Time until at least one token is available: `ceil((1 - tokens) / rate * 1000)` ms
    pub fn wait_time(&mut self) -> Duration {
        self.refill(Instant::now());
        if self.tokens >= 1 {
            return Duration::ZERO;
        }
        let missing = 1.0 - f64::from(self.tokens);
        let elapsed_ms = Instant::now()
            .saturating_duration_since(self.last_refill)
            .as_secs_f64()
            * 1000.0;
        let ms = (missing / self.refill_rate * 1000.0 - elapsed_ms).ceil().max(1.0);
        Duration::from_millis(ms as u64)
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Rate limiter holding one bucket per enabled source
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Create buckets for every enabled source
    pub fn new(sources: &[MetadataSource]) -> Self {
        let buckets = sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| (s.id.clone(), TokenBucket::new(&s.rate_limit)))
            .collect();
        Self {
            buckets: Mutex::new(buckets),
        }
    }

    /// Try to take a permit for `source_id`.
    ///
    /// A source without a bucket (disabled or unknown) is always denied.
    pub async fn try_acquire(&self, source_id: &str) -> bool {
        let mut buckets = self.buckets.lock().await;
        match buckets.get_mut(source_id) {
            Some(bucket) => {
                let granted = bucket.try_acquire();
                if !granted {
                    debug!(source_id = %source_id, "Rate limit permit denied");
                }
                granted
            }
            None => false,
        }
    }

    /// How long until `source_id` will have a token.
    ///
    /// Returns `None` for sources without a bucket; waiting would never help.
    pub async fn wait_time(&self, source_id: &str) -> Option<Duration> {
        let mut buckets = self.buckets.lock().await;
        buckets.get_mut(source_id).map(TokenBucket::wait_time)
    }
}
