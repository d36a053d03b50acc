//! Tests for configuration resolution and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate VBS_CONFIG are marked with #[serial].

use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vbs_common::config::{
    is_valid_key, load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR,
};

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct SampleConfig {
    logging: LoggingConfig,
    name: Option<String>,
}

#[test]
#[serial]
fn test_cli_argument_wins_over_environment() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let resolved = resolve_config_path(Some(Path::new("/from/cli.toml")), CONFIG_ENV_VAR, "x.toml");
    assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_used_when_no_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR, "x.toml");
    assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_environment_value_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR, "vbs-test-does-not-exist.toml");
    assert_eq!(resolved, None);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.toml");

    let config: SampleConfig = load_toml_or_default(Some(&missing)).unwrap();
    assert_eq!(config, SampleConfig::default());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_no_path_yields_defaults() {
    let config: SampleConfig = load_toml_or_default(None).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_partial_file_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("partial.toml");
    std::fs::write(&path, "name = \"guide\"\n").unwrap();

    let config: SampleConfig = load_toml_or_default(Some(&path)).unwrap();
    assert_eq!(config.name.as_deref(), Some("guide"));
    assert_eq!(config.logging, LoggingConfig::default());
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "name = [unterminated").unwrap();

    let result: vbs_common::Result<SampleConfig> = load_toml_or_default(Some(&path));
    assert!(matches!(result, Err(vbs_common::Error::Config(_))));
}

#[test]
fn test_unreadable_path_is_io_error() {
    // A directory exists but cannot be read as a file
    let temp_dir = TempDir::new().unwrap();

    let result: vbs_common::Result<SampleConfig> = load_toml_or_default(Some(temp_dir.path()));
    assert!(matches!(result, Err(vbs_common::Error::Io(_))));
}

#[test]
fn test_is_valid_key() {
    assert!(is_valid_key("abc123"));
    assert!(!is_valid_key(""));
    assert!(!is_valid_key("  \t"));
}
