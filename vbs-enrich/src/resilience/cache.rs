//! TTL response cache
//!
//! Entries are evicted lazily: an expired entry is removed by the `get` that
//! finds it. Expired entries still count towards `len` until then.

use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use vbs_common::events::{EventBus, VbsEvent};

/// Default entry lifetime (24 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key for a source's response about one episode: `"<source>:<episode>"`
pub fn cache_key(source_id: &str, episode_id: &str) -> String {
    format!("{}:{}", source_id, episode_id)
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Keyed cache with per-entry time-to-live
pub struct ResponseCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    hits: Mutex<(u64, u64)>,
    event_bus: EventBus,
}

impl<V: Clone + Send> ResponseCache<V> {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: Mutex::new((0, 0)),
            event_bus,
        }
    }

    /// Value for `key`, if present and not expired
    pub async fn get(&self, key: &str) -> Option<V> {
        let found = {
            let mut entries = self.entries.lock().await;
            match entries.get(key) {
                Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
                Some(_) => {
                    entries.remove(key);
                    debug!(key = %key, "Cache entry expired");
                    None
                }
                None => None,
            }
        };

        let mut counters = self.hits.lock().await;
        if found.is_some() {
            counters.0 += 1;
        } else {
            counters.1 += 1;
        }
        found
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .unwrap_or_else(|| Instant::now() + DEFAULT_TTL);
        self.entries
            .lock()
            .await
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Drop every entry and emit a single `CacheCleared` event.
    ///
    /// Returns the number of entries removed (expired ones included).
    pub async fn clear(&self) -> usize {
        let removed = {
            let mut entries = self.entries.lock().await;
            let count = entries.len();
            entries.clear();
            count
        };

        info!(entries_removed = removed, "Response cache cleared");
        self.event_bus.emit_lossy(VbsEvent::CacheCleared {
            entries_removed: removed,
            timestamp: Utc::now(),
        });
        removed
    }

    /// Number of stored entries, expired or not
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        let (hits, misses) = *self.hits.lock().await;
        CacheStats {
            hits,
            misses,
            entries: self.len().await,
        }
    }
}
