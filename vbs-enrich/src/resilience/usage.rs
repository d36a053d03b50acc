//! Per-source usage counters

use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Counters for one source since startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceUsage {
    /// HTTP attempts issued (retries included)
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Attempts after the first for the same logical request
    pub retries: u64,
    /// Times a request had to wait for a rate limit permit
    pub rate_limit_waits: u64,
    /// Lookups answered from the response cache
    pub cache_hits: u64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum UsageEvent {
    Request,
    Success,
    Failure,
    Retry,
    RateLimitWait,
    CacheHit,
}

#[derive(Debug, Default)]
pub struct UsageTracker {
    sources: Mutex<HashMap<String, SourceUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn record(&self, source_id: &str, event: UsageEvent) {
        let mut sources = self.sources.lock().await;
        let usage = sources.entry(source_id.to_string()).or_default();
        let counter = match event {
            UsageEvent::Request => &mut usage.requests,
            UsageEvent::Success => &mut usage.successes,
            UsageEvent::Failure => &mut usage.failures,
            UsageEvent::Retry => &mut usage.retries,
            UsageEvent::RateLimitWait => &mut usage.rate_limit_waits,
            UsageEvent::CacheHit => &mut usage.cache_hits,
        };
        *counter += 1;
    }

    pub async fn get(&self, source_id: &str) -> SourceUsage {
        self.sources
            .lock()
            .await
            .get(source_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn snapshot(&self) -> HashMap<String, SourceUsage> {
        self.sources.lock().await.clone()
    }
}
