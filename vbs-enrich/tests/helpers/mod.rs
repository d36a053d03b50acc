//! Test Helper Utilities
//!
//! Shared utilities for testing vbs-enrich

#![allow(dead_code)]

pub mod fixtures;
pub mod log_capture;
pub mod mock_transport;

pub use fixtures::*;
pub use log_capture::LogCapture;
pub use mock_transport::{MockReply, MockTransport};

use std::sync::Arc;
use vbs_common::events::{EventBus, VbsEvent};
use vbs_enrich::{EnrichmentConfig, EnrichmentOrchestrator};

/// Configuration pointing both sources at test endpoints, without jitter
pub fn test_config() -> EnrichmentConfig {
    let mut config = EnrichmentConfig::default();
    for source in &mut config.sources {
        source.retry.jitter_ms = 0;
    }
    config.sources[0].endpoint = MEMORY_ALPHA_ENDPOINT.to_string();
    config.sources[1].endpoint = TMDB_ENDPOINT.to_string();
    config.sources[1].api_key = Some(TMDB_TEST_KEY.to_string());
    config
}

/// Orchestrator over `transport` plus a subscriber seeing every event it emits
pub fn create_test_orchestrator(
    config: EnrichmentConfig,
    transport: Arc<MockTransport>,
) -> (EnrichmentOrchestrator, tokio::sync::broadcast::Receiver<VbsEvent>) {
    let event_bus = EventBus::new(256);
    let rx = event_bus.subscribe();
    (
        EnrichmentOrchestrator::with_transport(config, transport, event_bus),
        rx,
    )
}

/// Drain every event currently buffered on `rx`
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<VbsEvent>) -> Vec<VbsEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Events of one kind, by wire name
pub fn events_named<'a>(events: &'a [VbsEvent], name: &str) -> Vec<&'a VbsEvent> {
    events.iter().filter(|e| e.event_name() == name).collect()
}
