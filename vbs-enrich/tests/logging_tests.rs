//! Log filter tests
//!
//! Startup installs the subscriber before loading configuration, so warnings
//! raised during the load must be recorded, and the configured level applies
//! from then on.
//!
//! Note: Uses serial_test crate because RUST_LOG and VBS_* are process-wide.

mod helpers;

use helpers::LogCapture;
use serial_test::serial;
use tracing::dispatcher::{self, Dispatch};
use tracing_subscriber::layer::SubscriberExt;
use vbs_common::Error;
use vbs_enrich::config::TMDB_API_KEY_ENV_VAR;
use vbs_enrich::{logging, EnrichmentConfig};

fn clear_env() {
    std::env::remove_var("RUST_LOG");
    std::env::remove_var(TMDB_API_KEY_ENV_VAR);
    std::env::remove_var("VBS_CONFIG");
}

#[test]
#[serial]
fn test_config_load_warnings_reach_the_log() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");

    // Given: a subscriber installed the way startup does it
    let capture = LogCapture::new();
    let (filter, log_filter) = logging::filter_layer();
    let dispatch = Dispatch::new(
        tracing_subscriber::registry()
            .with(filter)
            .with(capture.clone()),
    );

    dispatcher::with_default(&dispatch, || {
        // When: configuration is loaded from a missing file without a TMDB key
        let config = EnrichmentConfig::load(Some(&missing)).unwrap();

        // Then: both load warnings were recorded
        capture.assert_contains("Configuration file not found");
        capture.assert_contains("TMDB API key not configured");

        // And: the configured level is applied afterwards
        assert_eq!(config.logging.level, "info");
        assert!(log_filter.apply_config_level("error").unwrap());

        capture.clear();
        tracing::warn!("filtered out after narrowing");
        tracing::error!("still recorded");
        assert!(capture.matching("filtered out").is_empty());
        capture.assert_contains("still recorded");
    });
}

#[test]
#[serial]
fn test_invalid_level_is_config_error() {
    clear_env();
    let (_filter, log_filter) = logging::filter_layer();

    let result = log_filter.apply_config_level("vbs_enrich=loud");

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_rust_log_keeps_precedence() {
    clear_env();
    std::env::set_var("RUST_LOG", "debug");
    let (_filter, log_filter) = logging::filter_layer();

    let changed = log_filter.apply_config_level("error").unwrap();

    assert!(!changed);
    clear_env();
}
