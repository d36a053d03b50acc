//! Enrichment orchestrator
//!
//! Runs every enabled source adapter for an episode, in ascending priority
//! order and one at a time, then picks (or merges) the final record.
//! A failing source never aborts enrichment; it only shrinks the pool of
//! candidate records.

use crate::config::{EnrichmentConfig, MergeMode};
use crate::conflict::{ConflictResolutionConfig, ConflictResolutionConfigUpdate, ConflictResolver};
use crate::error::EnrichmentError;
use crate::resilience::{
    CacheStats, HealthMonitor, HealthStatus, HttpTransport, RateLimiter, RequestExecutor,
    ReqwestTransport, ResponseCache, SourceUsage, TransportError, UsageTracker,
};
use crate::sources::{MemoryAlphaAdapter, MetadataAdapter, SourceContext, TmdbAdapter};
use crate::types::{
    EpisodeMetadata, EpisodeRequest, MetadataSource, MEMORY_ALPHA_SOURCE_ID, TMDB_SOURCE_ID,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vbs_common::events::{EventBus, SourceFailure, VbsEvent};

/// Outcome of [`EnrichmentOrchestrator::enrich_batch`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub completed: Vec<EpisodeMetadata>,
    /// Episode ids for which every source failed
    pub failed: Vec<String>,
    /// Whether the batch stopped early on cancellation
    pub cancelled: bool,
}

/// Source records and failures collected for one episode
struct Collected {
    records: Vec<EpisodeMetadata>,
    contributors: Vec<String>,
    failures: Vec<SourceFailure>,
}

pub struct EnrichmentOrchestrator {
    /// Every configured source, ascending priority
    sources: Vec<MetadataSource>,
    adapters: HashMap<String, Arc<dyn MetadataAdapter>>,
    merge_mode: MergeMode,
    resolver: RwLock<ConflictResolver>,
    cache: Arc<ResponseCache<EpisodeMetadata>>,
    health: Arc<HealthMonitor>,
    usage: Arc<UsageTracker>,
    executor: Arc<RequestExecutor>,
    cache_ttl: std::time::Duration,
    event_bus: EventBus,
}

impl EnrichmentOrchestrator {
    /// Orchestrator talking to the real source APIs
    pub fn new(config: EnrichmentConfig, event_bus: EventBus) -> Result<Self, TransportError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_transport(config, transport, event_bus))
    }

    /// Orchestrator over an arbitrary HTTP transport
    pub fn with_transport(
        config: EnrichmentConfig,
        transport: Arc<dyn HttpTransport>,
        event_bus: EventBus,
    ) -> Self {
        let mut sources = config.sources.clone();
        sources.sort_by_key(|s| s.priority);

        let health = Arc::new(HealthMonitor::with_sources(
            event_bus.clone(),
            sources.iter().filter(|s| s.enabled).map(|s| s.id.clone()),
        ));
        let usage = Arc::new(UsageTracker::new());
        let cache = Arc::new(ResponseCache::new(event_bus.clone()));
        let executor = Arc::new(
            RequestExecutor::new(
                transport,
                Arc::new(RateLimiter::new(&sources)),
                health.clone(),
                usage.clone(),
            )
            .with_timeout(config.request_timeout()),
        );

        let mut orchestrator = Self {
            sources: Vec::new(),
            adapters: HashMap::new(),
            merge_mode: config.merge_mode,
            resolver: RwLock::new(ConflictResolver::new(
                config.conflict_resolution.clone(),
                event_bus.clone(),
            )),
            cache,
            health,
            usage,
            executor,
            cache_ttl: config.cache_ttl(),
            event_bus,
        };

        for source in &sources {
            let context = orchestrator.context_for(source);
            let adapter: Arc<dyn MetadataAdapter> = match source.id.as_str() {
                MEMORY_ALPHA_SOURCE_ID => Arc::new(MemoryAlphaAdapter::new(context)),
                TMDB_SOURCE_ID => Arc::new(TmdbAdapter::new(context)),
                other => {
                    warn!(source_id = %other, "No built-in adapter for source, register one");
                    continue;
                }
            };
            orchestrator.adapters.insert(source.id.clone(), adapter);
        }
        orchestrator.sources = sources;

        info!(
            sources = ?orchestrator.sources.iter().filter(|s| s.enabled).map(|s| s.id.as_str()).collect::<Vec<_>>(),
            merge_mode = ?orchestrator.merge_mode,
            "Enrichment orchestrator initialized"
        );
        orchestrator
    }

    /// Shared services for `source`, for building custom adapters
    pub fn context_for(&self, source: &MetadataSource) -> SourceContext {
        SourceContext::new(
            source.clone(),
            self.executor.clone(),
            self.health.clone(),
            self.cache.clone(),
            self.usage.clone(),
            self.event_bus.clone(),
        )
        .with_cache_ttl(self.cache_ttl)
    }

    /// Install (or replace) the adapter serving a configured source
    pub fn register_adapter(&mut self, adapter: Arc<dyn MetadataAdapter>) -> Result<(), EnrichmentError> {
        let id = adapter.source_id().to_string();
        if !self.sources.iter().any(|s| s.id == id) {
            return Err(EnrichmentError::UnknownSource(id));
        }
        self.adapters.insert(id, adapter);
        Ok(())
    }

    pub fn set_merge_mode(&mut self, mode: MergeMode) {
        self.merge_mode = mode;
    }

    pub fn merge_mode(&self) -> MergeMode {
        self.merge_mode
    }

    /// Enrich one episode from every enabled source.
    ///
    /// Returns `None` (after emitting `EnrichmentFailed`) when no source
    /// produced a record.
    pub async fn enrich_episode(&self, request: impl Into<EpisodeRequest>) -> Option<EpisodeMetadata> {
        let request = request.into();
        debug!(episode_id = %request.id, "Enriching episode");

        let collected = self.collect(&request).await;
        if collected.records.is_empty() {
            error!(
                episode_id = %request.id,
                failures = collected.failures.len(),
                "Enrichment failed for every source"
            );
            self.event_bus.emit_lossy(VbsEvent::EnrichmentFailed {
                episode_id: request.id.clone(),
                errors: collected.failures,
                timestamp: Utc::now(),
            });
            return None;
        }

        let mut record = match self.merge_mode {
            MergeMode::BestRecord => best_record(&collected.records).clone(),
            MergeMode::FieldLevel => self.merge_fields(&collected.records).await,
        };
        if let Some(previous) = &request.previous {
            record.carry_history_from(previous);
        }

        info!(
            episode_id = %request.id,
            source_id = %record.data_source,
            confidence = record.confidence_score,
            contributors = collected.contributors.len(),
            status = ?record.enrichment_status,
            "Episode enriched"
        );
        self.event_bus.emit_lossy(VbsEvent::EnrichmentCompleted {
            episode_id: request.id.clone(),
            sources: collected.contributors,
            confidence_score: record.confidence_score,
            timestamp: Utc::now(),
        });
        Some(record)
    }

    async fn collect(&self, request: &EpisodeRequest) -> Collected {
        let mut collected = Collected {
            records: Vec::new(),
            contributors: Vec::new(),
            failures: Vec::new(),
        };

        for source in self.sources.iter().filter(|s| s.enabled) {
            let Some(adapter) = self.adapters.get(&source.id) else {
                continue;
            };
            match adapter.fetch(request).await {
                Ok(Some(record)) => {
                    collected.contributors.push(source.id.clone());
                    collected.records.push(record);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        episode_id = %request.id,
                        source_id = %source.id,
                        category = %e.category(),
                        error = %e,
                        "Source failed, continuing with next source"
                    );
                    collected.failures.push(e.to_failure(&source.id));
                }
            }
        }
        collected
    }

    /// Field-level merge: start from the best record, fill gaps from the
    /// others in priority order, then resolve disagreements.
    async fn merge_fields(&self, records: &[EpisodeMetadata]) -> EpisodeMetadata {
        let mut merged = best_record(records).clone();

        let names: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.fields.keys().map(String::as_str))
            .collect();
        for name in names {
            if merged.is_field_valid(name) {
                continue;
            }
            let donor = records.iter().find(|r| r.is_field_valid(name));
            if let Some((donor, value)) = donor.and_then(|r| r.field(name).map(|v| (r, v.clone()))) {
                merged.set_field(name, Some(value), &donor.data_source);
            }
        }

        let resolver = self.resolver.read().await;
        resolver.apply_conflicts(&mut merged, records);
        merged.refresh_status();
        merged
    }

    /// Enrich `requests` one by one, stopping between episodes on cancellation
    pub async fn enrich_batch<I, R>(&self, requests: I, cancel_token: &CancellationToken) -> BatchReport
    where
        I: IntoIterator<Item = R>,
        R: Into<EpisodeRequest>,
    {
        let requests: Vec<EpisodeRequest> = requests.into_iter().map(Into::into).collect();
        let total = requests.len();
        let mut report = BatchReport::default();

        for (index, request) in requests.into_iter().enumerate() {
            if cancel_token.is_cancelled() {
                info!(processed = index, total, "Batch enrichment cancelled");
                report.cancelled = true;
                break;
            }

            let episode_id = request.id.clone();
            match self.enrich_episode(request).await {
                Some(record) => report.completed.push(record),
                None => report.failed.push(episode_id.clone()),
            }

            self.event_bus.emit_lossy(VbsEvent::BatchProgress {
                episode_id,
                processed: index + 1,
                total,
                failed: report.failed.len(),
                timestamp: Utc::now(),
            });
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "Batch enrichment finished"
        );
        report
    }

    /// Drop every cached response; returns the number of entries removed
    pub async fn clear_cache(&self) -> usize {
        self.cache.clear().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Health snapshot per source
    pub async fn health_status(&self) -> HashMap<String, HealthStatus> {
        self.health.all().await
    }

    /// Usage counters per source
    pub async fn usage_stats(&self) -> HashMap<String, SourceUsage> {
        self.usage.snapshot().await
    }

    /// Merge a partial update into the conflict resolver configuration.
    ///
    /// Resolutions already in progress keep the configuration they started with.
    pub async fn update_config(&self, update: ConflictResolutionConfigUpdate) {
        self.resolver.write().await.update_config(update);
    }

    pub async fn conflict_config(&self) -> ConflictResolutionConfig {
        self.resolver.read().await.config().clone()
    }

    /// Resolver shared with this orchestrator, for batch conflict resolution
    pub fn resolver(&self) -> &RwLock<ConflictResolver> {
        &self.resolver
    }

    pub fn sources(&self) -> &[MetadataSource] {
        &self.sources
    }
}

/// Highest confidence wins; the earliest record wins ties
fn best_record(records: &[EpisodeMetadata]) -> &EpisodeMetadata {
    let mut best = &records[0];
    for record in &records[1..] {
        if record.confidence_score > best.confidence_score {
            best = record;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_record_tie_keeps_first() {
        let records = vec![
            EpisodeMetadata::new("ent_s1_e01", "memory-alpha", 0.9),
            EpisodeMetadata::new("ent_s1_e01", "tmdb", 0.9),
            EpisodeMetadata::new("ent_s1_e01", "other", 0.5),
        ];
        assert_eq!(best_record(&records).data_source, "memory-alpha");
    }

    #[test]
    fn test_best_record_prefers_higher_confidence() {
        let records = vec![
            EpisodeMetadata::new("ent_s1_e01", "memory-alpha", 0.6),
            EpisodeMetadata::new("ent_s1_e01", "tmdb", 0.85),
        ];
        assert_eq!(best_record(&records).data_source, "tmdb");
    }
}
