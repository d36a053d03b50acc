//! Metadata source adapters
//!
//! Each adapter turns an [`EpisodeRequest`] into a source-specific HTTP
//! exchange and parses the answer into a partial [`EpisodeMetadata`]. The
//! surrounding steps are shared and live in [`MetadataAdapter::fetch`]:
//!
//! 1. Fail fast when the source is disabled or its circuit is open
//! 2. Answer from the response cache when possible
//! 3. [`MetadataAdapter::lookup`] (adapter specific, via the request executor)
//! 4. Cache the record and emit `MetadataEnriched`

pub mod memory_alpha;
pub mod tmdb;

pub use memory_alpha::MemoryAlphaAdapter;
pub use tmdb::TmdbAdapter;

use crate::error::{EnrichmentError, EnrichmentResult};
use crate::resilience::cache::cache_key;
use crate::resilience::usage::UsageEvent;
use crate::resilience::{
    HealthMonitor, HttpRequest, RequestExecutor, ResponseCache, UsageTracker, DEFAULT_TTL,
};
use crate::types::{EpisodeMetadata, EpisodeRequest, MetadataSource};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use vbs_common::events::{EventBus, VbsEvent};

/// Shared services handed to every adapter
#[derive(Clone)]
pub struct SourceContext {
    source: MetadataSource,
    executor: Arc<RequestExecutor>,
    health: Arc<HealthMonitor>,
    cache: Arc<ResponseCache<EpisodeMetadata>>,
    usage: Arc<UsageTracker>,
    event_bus: EventBus,
    cache_ttl: Duration,
}

impl SourceContext {
    pub fn new(
        source: MetadataSource,
        executor: Arc<RequestExecutor>,
        health: Arc<HealthMonitor>,
        cache: Arc<ResponseCache<EpisodeMetadata>>,
        usage: Arc<UsageTracker>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            source,
            executor,
            health,
            cache,
            usage,
            event_bus,
            cache_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn source(&self) -> &MetadataSource {
        &self.source
    }

    /// Disabled → `SourceDisabled`; circuit open → `SourceUnhealthy`
    pub async fn ensure_available(&self) -> EnrichmentResult<()> {
        if !self.source.enabled {
            return Err(EnrichmentError::SourceDisabled(self.source.id.clone()));
        }
        if !self.health.can_request(&self.source.id).await {
            let consecutive_failures = self
                .health
                .status(&self.source.id)
                .await
                .map(|s| s.consecutive_failures)
                .unwrap_or_default();
            return Err(EnrichmentError::SourceUnhealthy {
                source_id: self.source.id.clone(),
                consecutive_failures,
            });
        }
        Ok(())
    }

    async fn cached(&self, episode_id: &str) -> Option<EpisodeMetadata> {
        let hit = self
            .cache
            .get(&cache_key(&self.source.id, episode_id))
            .await;
        if hit.is_some() {
            self.usage.record(&self.source.id, UsageEvent::CacheHit).await;
            debug!(source_id = %self.source.id, episode_id = %episode_id, "Cache hit");
        }
        hit
    }

    /// Run `request` through the executor and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, request: &HttpRequest) -> EnrichmentResult<T> {
        let response = self
            .executor
            .execute(request, &self.source.id, &self.source.retry)
            .await?;
        serde_json::from_str(&response.body).map_err(|e| {
            EnrichmentError::data_format(&self.source.id, format!("invalid JSON body: {}", e))
        })
    }

    /// Empty record stamped with this source's id and confidence
    pub fn new_record(&self, episode_id: &str) -> EpisodeMetadata {
        EpisodeMetadata::new(episode_id, self.source.id.clone(), self.source.confidence)
    }

    async fn store(&self, mut record: EpisodeMetadata) -> EpisodeMetadata {
        record.refresh_status();
        self.cache
            .set(
                cache_key(&self.source.id, &record.episode_id),
                record.clone(),
                self.cache_ttl,
            )
            .await;

        self.event_bus.emit_lossy(VbsEvent::MetadataEnriched {
            episode_id: record.episode_id.clone(),
            source_id: self.source.id.clone(),
            confidence_score: record.confidence_score,
            timestamp: Utc::now(),
        });
        record
    }
}

/// One external metadata provider
#[async_trait]
pub trait MetadataAdapter: Send + Sync {
    /// Shared services for this source
    fn context(&self) -> &SourceContext;

    /// Source-specific request and parse; `Ok(None)` when the source has no
    /// record for the episode
    async fn lookup(&self, request: &EpisodeRequest) -> EnrichmentResult<Option<EpisodeMetadata>>;

    fn source_id(&self) -> &str {
        &self.context().source().id
    }

    /// Fetch a partial record for `request`
    async fn fetch(&self, request: &EpisodeRequest) -> EnrichmentResult<Option<EpisodeMetadata>> {
        let context = self.context();
        context.ensure_available().await?;

        if let Some(record) = context.cached(&request.id).await {
            return Ok(Some(record));
        }

        match self.lookup(request).await? {
            Some(record) => Ok(Some(context.store(record).await)),
            None => {
                debug!(
                    source_id = %self.source_id(),
                    episode_id = %request.id,
                    "Source has no record for episode"
                );
                Ok(None)
            }
        }
    }
}
