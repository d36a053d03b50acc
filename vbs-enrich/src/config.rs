//! Configuration for the enrichment pipeline
//!
//! Resolution order for the file: CLI argument → `VBS_CONFIG` → platform
//! config dir → compiled defaults. The TMDB API key is resolved separately:
//! `VBS_TMDB_API_KEY` → `api_key` in the TMDB `[[sources]]` entry.

use crate::conflict::ConflictResolutionConfig;
use crate::types::{MetadataSource, TMDB_SOURCE_ID};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use vbs_common::config::{
    is_valid_key, load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR,
};
use vbs_common::{Error, Result};

/// File name under the platform config dir
pub const CONFIG_FILE_NAME: &str = "enrichment.toml";

/// Environment variable holding the TMDB read access token
pub const TMDB_API_KEY_ENV_VAR: &str = "VBS_TMDB_API_KEY";

/// How the orchestrator combines records from several sources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMode {
    /// Return the single highest-confidence record
    #[default]
    BestRecord,
    /// Merge field by field, resolving disagreements
    FieldLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 86_400 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Per-attempt abort timeout
    pub timeout_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Top-level `enrichment.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub request: RequestConfig,
    pub merge_mode: MergeMode,
    pub sources: Vec<MetadataSource>,
    pub conflict_resolution: ConflictResolutionConfig,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
            request: RequestConfig::default(),
            merge_mode: MergeMode::default(),
            sources: vec![MetadataSource::memory_alpha(), MetadataSource::tmdb()],
            conflict_resolution: ConflictResolutionConfig::default(),
        }
    }
}

impl EnrichmentConfig {
    /// Resolve, load and validate the configuration.
    ///
    /// # Errors
    /// `Error::Io` when the file exists but cannot be read. `Error::Config`
    /// when it is malformed or fails validation.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        let mut config: Self = load_toml_or_default(path.as_deref())?;

        config.apply_tmdb_key(std::env::var(TMDB_API_KEY_ENV_VAR).ok());
        config.validate()?;
        Ok(config)
    }

    /// Install the TMDB key, environment first, then the file.
    ///
    /// An enabled TMDB source left without a usable key is disabled.
    pub fn apply_tmdb_key(&mut self, env_key: Option<String>) {
        let Some(tmdb) = self.sources.iter_mut().find(|s| s.id == TMDB_SOURCE_ID) else {
            return;
        };

        match env_key.filter(|k| is_valid_key(k)) {
            Some(key) => {
                if tmdb.api_key.as_deref().is_some_and(is_valid_key) {
                    warn!(
                        "TMDB API key found in environment and config file, using {}",
                        TMDB_API_KEY_ENV_VAR
                    );
                }
                info!("TMDB API key loaded from environment variable");
                tmdb.api_key = Some(key);
            }
            None if tmdb.api_key.as_deref().is_some_and(is_valid_key) => {
                info!("TMDB API key loaded from config file");
            }
            None => {
                tmdb.api_key = None;
                if tmdb.enabled {
                    warn!(
                        "TMDB API key not configured, TMDB source disabled. Set {} or api_key in the tmdb [[sources]] entry",
                        TMDB_API_KEY_ENV_VAR
                    );
                    tmdb.enabled = false;
                }
            }
        }
    }

    /// Check source definitions for values the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            let invalid = |what: &str| Error::Config(format!("source {}: {}", source.id, what));

            if source.id.trim().is_empty() {
                return Err(Error::Config("source with empty id".to_string()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(invalid("duplicate source id"));
            }
            if !(0.0..=1.0).contains(&source.confidence) {
                return Err(invalid("confidence must be within 0.0..=1.0"));
            }
            if !(source.rate_limit.requests_per_second > 0.0) {
                return Err(invalid("requests_per_second must be positive"));
            }
            if source.rate_limit.burst_size == 0 {
                return Err(invalid("burst_size must be at least 1"));
            }
            if source.retry.max_delay_ms < source.retry.initial_delay_ms {
                return Err(invalid("max_delay_ms must not be below initial_delay_ms"));
            }
            if !(source.retry.backoff_multiplier >= 1.0) {
                return Err(invalid("backoff_multiplier must be at least 1.0"));
            }
        }

        let threshold = self.conflict_resolution.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "conflict_resolution.confidence_threshold {} outside 0.0..=1.0",
                threshold
            )));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request.timeout_secs.max(1))
    }

    /// Enabled sources in call order (ascending priority)
    pub fn enabled_sources(&self) -> Vec<MetadataSource> {
        let mut sources: Vec<_> = self.sources.iter().filter(|s| s.enabled).cloned().collect();
        sources.sort_by_key(|s| s.priority);
        sources
    }
}
