//! Event types for the VBS event system
//!
//! Provides shared event definitions and the EventBus used to publish
//! enrichment status to UI and logging collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One failed source attempt, as reported in `EnrichmentFailed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    /// Metadata source identifier (e.g. "tmdb")
    pub source_id: String,
    /// Error category tag (e.g. "rate-limit", "authentication")
    pub category: String,
    /// Whether the failure class is retryable
    pub retryable: bool,
    /// Human-readable error message
    pub message: String,
}

/// VBS event types
///
/// Events are broadcast via EventBus and serialize with a kebab-case `type`
/// tag (`metadata-enriched`, `cache-cleared`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VbsEvent {
    /// A source adapter produced a fresh record for an episode
    ///
    /// Triggers:
    /// - Cache store: persist the partial record
    /// - UI: per-source progress indicator
    MetadataEnriched {
        /// Episode identifier (e.g. "ent_s1_e01")
        episode_id: String,
        /// Source that produced the record
        source_id: String,
        /// Confidence score of the record (0.0-1.0)
        confidence_score: f64,
        /// When the record was produced
        timestamp: DateTime<Utc>,
    },

    /// Enrichment of an episode finished with at least one usable record
    EnrichmentCompleted {
        /// Episode identifier
        episode_id: String,
        /// Every source that contributed a record, in call order
        sources: Vec<String>,
        /// Confidence score of the returned record
        confidence_score: f64,
        /// When enrichment completed
        timestamp: DateTime<Utc>,
    },

    /// Every enabled source failed for an episode
    ///
    /// Triggers:
    /// - UI: non-fatal notification toast
    EnrichmentFailed {
        /// Episode identifier
        episode_id: String,
        /// One entry per failed source
        errors: Vec<SourceFailure>,
        /// When enrichment failed
        timestamp: DateTime<Utc>,
    },

    /// Health of a metadata source was updated
    ///
    /// Fires on every success or failure record, not only on transitions.
    #[serde(rename = "health-status-change")]
    HealthStatusChanged {
        /// Source identifier
        source_id: String,
        /// Whether the source is currently healthy
        is_healthy: bool,
        /// Consecutive failures observed
        consecutive_failures: u32,
        /// When the status was updated
        timestamp: DateTime<Utc>,
    },

    /// Response cache was cleared
    CacheCleared {
        /// Number of entries removed (expired entries included)
        entries_removed: usize,
        /// When the cache was cleared
        timestamp: DateTime<Utc>,
    },

    /// A field conflict was resolved (or parked for manual review)
    ConflictResolved {
        /// Episode identifier
        episode_id: String,
        /// Field that was in conflict
        field_name: String,
        /// Strategy actually applied
        strategy: String,
        /// Whether the value was left for a human to decide
        requires_manual_review: bool,
        /// When the conflict was resolved
        timestamp: DateTime<Utc>,
    },

    /// Progress of a batch enrichment run
    BatchProgress {
        /// Episode just processed
        episode_id: String,
        /// Episodes processed so far (success or failure)
        processed: usize,
        /// Episodes in the batch
        total: usize,
        /// Failures so far
        failed: usize,
        /// When progress was reported
        timestamp: DateTime<Utc>,
    },
}

impl VbsEvent {
    /// Wire name of the event (matches the serialized `type` tag)
    pub fn event_name(&self) -> &'static str {
        match self {
            VbsEvent::MetadataEnriched { .. } => "metadata-enriched",
            VbsEvent::EnrichmentCompleted { .. } => "enrichment-completed",
            VbsEvent::EnrichmentFailed { .. } => "enrichment-failed",
            VbsEvent::HealthStatusChanged { .. } => "health-status-change",
            VbsEvent::CacheCleared { .. } => "cache-cleared",
            VbsEvent::ConflictResolved { .. } => "conflict-resolved",
            VbsEvent::BatchProgress { .. } => "batch-progress",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers, each seeing events in emission order
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Capacity Recommendations
/// - Desktop: 1000
/// - Testing: 10-100
///
/// # Examples
///
/// ```
/// use vbs_common::events::{EventBus, VbsEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(VbsEvent::CacheCleared {
///     entries_removed: 0,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(VbsEvent::CacheCleared { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VbsEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<VbsEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: VbsEvent) -> Result<usize, broadcast::error::SendError<VbsEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Enrichment notifications are advisory; nobody listening is not an error.
    pub fn emit_lossy(&self, event: VbsEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_cleared() -> VbsEvent {
        VbsEvent::CacheCleared {
            entries_removed: 3,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        assert!(bus.emit(cache_cleared()).is_err());
        // Lossy variant never fails
        bus.emit_lossy(cache_cleared());
    }

    #[test]
    fn test_subscribers_receive_in_emission_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(cache_cleared());
        bus.emit_lossy(VbsEvent::HealthStatusChanged {
            source_id: "tmdb".to_string(),
            is_healthy: false,
            consecutive_failures: 3,
            timestamp: Utc::now(),
        });

        assert_eq!(rx.try_recv().unwrap().event_name(), "cache-cleared");
        assert_eq!(rx.try_recv().unwrap().event_name(), "health-status-change");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_with_kebab_case_tag() {
        let json = serde_json::to_value(VbsEvent::EnrichmentFailed {
            episode_id: "tng_s3_e15".to_string(),
            errors: vec![SourceFailure {
                source_id: "tmdb".to_string(),
                category: "authentication".to_string(),
                retryable: false,
                message: "401".to_string(),
            }],
            timestamp: Utc::now(),
        })
        .unwrap();

        assert_eq!(json["type"], "enrichment-failed");
        assert_eq!(json["errors"][0]["category"], "authentication");
    }

    #[test]
    fn test_subscriber_count_and_capacity() {
        let bus = EventBus::new(42);
        assert_eq!(bus.capacity(), 42);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }
}
