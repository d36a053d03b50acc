//! Per-source health monitor (circuit breaker)
//!
//! HEALTHY → (3 consecutive failures) → UNHEALTHY. While unhealthy, requests
//! are skipped until the cool-down elapses; the next success closes the
//! circuit again regardless of the cool-down.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vbs_common::events::{EventBus, VbsEvent};

/// Consecutive failures that open the circuit
pub const UNHEALTHY_THRESHOLD: u32 = 3;

/// Upper bound on the cool-down
pub const MAX_COOLDOWN: Duration = Duration::from_millis(300_000);

/// Health snapshot of one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Wall-clock earliest retry; only meaningful while unhealthy
    pub next_retry_time: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    /// Monotonic deadline backing `next_retry_time`
    #[serde(skip)]
    retry_at: Option<Instant>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            is_healthy: true,
            last_success: None,
            consecutive_failures: 0,
            next_retry_time: None,
            last_latency_ms: None,
            retry_at: None,
        }
    }
}

impl HealthStatus {
    /// Whether a request may be issued now: healthy, or the cool-down elapsed
    pub fn allows_request(&self) -> bool {
        self.is_healthy || self.retry_at.map(|at| Instant::now() >= at).unwrap_or(true)
    }

    /// Remaining cool-down, if the circuit is open
    pub fn retry_in(&self) -> Option<Duration> {
        if self.is_healthy {
            return None;
        }
        self.retry_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// Cool-down after `failures` consecutive failures: `min(1000 * 2^failures, 300000)` ms
pub fn cooldown_for(failures: u32) -> Duration {
    let ms = 2u64
        .checked_pow(failures)
        .and_then(|factor| factor.checked_mul(1000))
        .unwrap_or(u64::MAX);
    Duration::from_millis(ms).min(MAX_COOLDOWN)
}

/// Health monitor tracking every source seen by the pipeline
pub struct HealthMonitor {
    statuses: Mutex<HashMap<String, HealthStatus>>,
    event_bus: EventBus,
}

impl HealthMonitor {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            event_bus,
        }
    }

    /// Monitor with `source_ids` pre-registered as healthy
    pub fn with_sources<I, S>(event_bus: EventBus, source_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let statuses = source_ids
            .into_iter()
            .map(|id| (id.into(), HealthStatus::default()))
            .collect();
        Self {
            statuses: Mutex::new(statuses),
            event_bus,
        }
    }

    /// Register a source as healthy (idempotent)
    pub async fn register(&self, source_id: &str) {
        self.statuses
            .lock()
            .await
            .entry(source_id.to_string())
            .or_default();
    }

    /// Whether a request to `source_id` may be issued now.
    ///
    /// Unknown sources are treated as healthy.
    pub async fn can_request(&self, source_id: &str) -> bool {
        self.statuses
            .lock()
            .await
            .get(source_id)
            .map(HealthStatus::allows_request)
            .unwrap_or(true)
    }

    /// Record a successful request: closes the circuit and resets failures
    pub async fn record_success(&self, source_id: &str, latency: Duration) {
        let snapshot = {
            let mut statuses = self.statuses.lock().await;
            let status = statuses.entry(source_id.to_string()).or_default();
            let was_unhealthy = !status.is_healthy;

            status.is_healthy = true;
            status.consecutive_failures = 0;
            status.next_retry_time = None;
            status.retry_at = None;
            status.last_success = Some(Utc::now());
            status.last_latency_ms = Some(latency.as_millis() as u64);

            if was_unhealthy {
                info!(source_id = %source_id, "Source recovered, circuit closed");
            } else {
                debug!(
                    source_id = %source_id,
                    latency_ms = latency.as_millis() as u64,
                    "Source request succeeded"
                );
            }
            status.clone()
        };

        self.emit(source_id, &snapshot);
    }

    /// Record a failed request; opens (or extends) the circuit at the threshold
    pub async fn record_failure(&self, source_id: &str) {
        let snapshot = {
            let mut statuses = self.statuses.lock().await;
            let status = statuses.entry(source_id.to_string()).or_default();
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);

            if status.consecutive_failures >= UNHEALTHY_THRESHOLD {
                let cooldown = cooldown_for(status.consecutive_failures);
                status.is_healthy = false;
                status.retry_at = Some(Instant::now() + cooldown);
                status.next_retry_time = Some(vbs_common::time::after(cooldown));

                warn!(
                    source_id = %source_id,
                    consecutive_failures = status.consecutive_failures,
                    cooldown_ms = cooldown.as_millis() as u64,
                    "Source marked unhealthy"
                );
            } else {
                debug!(
                    source_id = %source_id,
                    consecutive_failures = status.consecutive_failures,
                    "Source request failed"
                );
            }
            status.clone()
        };

        self.emit(source_id, &snapshot);
    }

    /// Snapshot of one source
    pub async fn status(&self, source_id: &str) -> Option<HealthStatus> {
        self.statuses.lock().await.get(source_id).cloned()
    }

    /// Snapshot of every tracked source
    pub async fn all(&self) -> HashMap<String, HealthStatus> {
        self.statuses.lock().await.clone()
    }

    fn emit(&self, source_id: &str, status: &HealthStatus) {
        self.event_bus.emit_lossy(VbsEvent::HealthStatusChanged {
            source_id: source_id.to_string(),
            is_healthy: status.is_healthy,
            consecutive_failures: status.consecutive_failures,
            timestamp: Utc::now(),
        });
    }
}
