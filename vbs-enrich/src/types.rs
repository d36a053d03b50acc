//! Core Types for the enrichment pipeline
//!
//! Source configuration, episode identifiers and the `EpisodeMetadata` record
//! produced by enrichment.

use crate::error::EnrichmentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Memory Alpha source identifier
pub const MEMORY_ALPHA_SOURCE_ID: &str = "memory-alpha";

/// TMDB source identifier
pub const TMDB_SOURCE_ID: &str = "tmdb";

/// Schema version stamped on every produced record
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Field names the adapters know how to extract
pub mod fields {
    pub const TITLE: &str = "title";
    pub const SYNOPSIS: &str = "synopsis";
    pub const AIR_DATE: &str = "air_date";
    pub const STARDATE: &str = "stardate";
    pub const DIRECTOR: &str = "director";
    pub const WRITER: &str = "writer";
    pub const RUNTIME_MINUTES: &str = "runtime_minutes";
    pub const PRODUCTION_CODE: &str = "production_code";
    pub const RATING: &str = "rating";
    pub const MEMORY_ALPHA_URL: &str = "memory_alpha_url";
    pub const TMDB_ID: &str = "tmdb_id";

    /// Fields that must all be valid for a record to count as complete
    pub const REQUIRED: [&str; 3] = [TITLE, AIR_DATE, SYNOPSIS];
}

// ============================================================================
// Source configuration
// ============================================================================

/// Token bucket parameters for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Refill rate in tokens per second
    pub requests_per_second: f64,
    /// Bucket capacity (maximum burst)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            burst_size: 5,
        }
    }
}

/// Retry-with-backoff parameters for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound of the uniform random jitter added to each delay
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_ms: 100,
        }
    }
}

/// One external metadata provider
///
/// Immutable after construction; looked up by `id` throughout the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSource {
    /// Stable identifier ("memory-alpha", "tmdb")
    pub id: String,
    /// Display name
    pub name: String,
    /// Base endpoint (no trailing slash)
    pub endpoint: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Static confidence score (0.0-1.0) stamped on records from this source
    pub confidence: f64,
    /// Lower is called (and trusted) first
    pub priority: u32,
    /// Bearer token / API key, if the source needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl MetadataSource {
    /// Default Memory Alpha source (MediaWiki API)
    pub fn memory_alpha() -> Self {
        Self {
            id: MEMORY_ALPHA_SOURCE_ID.to_string(),
            name: "Memory Alpha".to_string(),
            endpoint: "https://memory-alpha.fandom.com/api.php".to_string(),
            enabled: true,
            rate_limit: RateLimitConfig {
                requests_per_second: 1.0,
                burst_size: 5,
            },
            retry: RetryConfig::default(),
            confidence: 0.9,
            priority: 1,
            api_key: None,
        }
    }

    /// Default TMDB source (v3 REST API)
    pub fn tmdb() -> Self {
        Self {
            id: TMDB_SOURCE_ID.to_string(),
            name: "The Movie Database".to_string(),
            endpoint: "https://api.themoviedb.org/3".to_string(),
            enabled: true,
            rate_limit: RateLimitConfig {
                requests_per_second: 4.0,
                burst_size: 10,
            },
            retry: RetryConfig::default(),
            confidence: 0.85,
            priority: 2,
            api_key: None,
        }
    }
}

// ============================================================================
// Episode identifiers
// ============================================================================

/// Known series: (code, display name, TMDB series id)
const SERIES: &[(&str, &str, u64)] = &[
    ("tos", "Star Trek: The Original Series", 253),
    ("tas", "Star Trek: The Animated Series", 1992),
    ("tng", "Star Trek: The Next Generation", 655),
    ("ds9", "Star Trek: Deep Space Nine", 580),
    ("voy", "Star Trek: Voyager", 1855),
    ("ent", "Star Trek: Enterprise", 314),
    ("dis", "Star Trek: Discovery", 67198),
    ("pic", "Star Trek: Picard", 85949),
    ("ld", "Star Trek: Lower Decks", 85948),
    ("pro", "Star Trek: Prodigy", 106393),
    ("snw", "Star Trek: Strange New Worlds", 103516),
];

/// Parsed `<seriesCode>_s<season>_e<episode>` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EpisodeId {
    pub series: String,
    pub season: u32,
    pub episode: u32,
}

impl EpisodeId {
    /// Parse an episode identifier such as `ent_s1_e01`.
    ///
    /// # Errors
    /// - `InvalidEpisodeId` when the pattern does not match
    /// - `UnknownSeries` when the series code is not in the catalog
    pub fn parse(raw: &str) -> Result<Self, EnrichmentError> {
        let invalid = || EnrichmentError::InvalidEpisodeId(raw.to_string());

        let mut parts = raw.split('_');
        let (Some(series), Some(season), Some(episode), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if series.is_empty() || !series.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        let season = parse_prefixed_number(season, 's').ok_or_else(invalid)?;
        let episode = parse_prefixed_number(episode, 'e').ok_or_else(invalid)?;

        let series = series.to_ascii_lowercase();
        if series_entry(&series).is_none() {
            return Err(EnrichmentError::UnknownSeries(series));
        }

        Ok(Self {
            series,
            season,
            episode,
        })
    }

    /// Display name of the series
    pub fn series_name(&self) -> &'static str {
        series_entry(&self.series).map(|(_, name, _)| *name).unwrap_or("Star Trek")
    }

    /// TMDB numeric id of the series
    pub fn tmdb_series_id(&self) -> Option<u64> {
        series_entry(&self.series).map(|(_, _, id)| *id)
    }
}

fn series_entry(code: &str) -> Option<&'static (&'static str, &'static str, u64)> {
    SERIES.iter().find(|(c, _, _)| *c == code)
}

fn parse_prefixed_number(part: &str, prefix: char) -> Option<u32> {
    let digits = part.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl FromStr for EpisodeId {
    type Err = EnrichmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_s{}_e{:02}", self.series, self.season, self.episode)
    }
}

/// Input to enrichment: an episode id plus an optional title hint
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRequest {
    /// Raw episode identifier, used verbatim for cache keys and events
    pub id: String,
    /// Episode title, used as a search term where a source supports search
    pub title: Option<String>,
    /// Record stored by an earlier enrichment of this episode. Its conflict
    /// history is carried into the new record.
    pub previous: Option<EpisodeMetadata>,
}

impl EpisodeRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            previous: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_previous(mut self, record: EpisodeMetadata) -> Self {
        self.previous = Some(record);
        self
    }
}

impl From<&str> for EpisodeRequest {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EpisodeRequest {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// Episode metadata record
// ============================================================================

/// Enrichment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Partial,
    Complete,
    Failed,
}

/// Validation outcome for one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValidation {
    pub is_valid: bool,
    /// Source the field value came from
    pub source: String,
}

/// Resolution strategy for a conflicting field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    HighestConfidence,
    MostRecent,
    SourcePriority,
    Consensus,
    Manual,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStrategy::HighestConfidence => "highest-confidence",
            ResolutionStrategy::MostRecent => "most-recent",
            ResolutionStrategy::SourcePriority => "source-priority",
            ResolutionStrategy::Consensus => "consensus",
            ResolutionStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one candidate considered during a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    pub source: String,
    pub value: Value,
    pub confidence: f64,
}

/// Audit entry appended to `EpisodeMetadata::conflict_resolution`
///
/// Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionRecord {
    pub field_name: String,
    pub candidates: Vec<CandidateSnapshot>,
    /// `None` when the field was left for manual review
    pub resolved_value: Option<Value>,
    pub strategy: ResolutionStrategy,
    pub requires_manual_review: bool,
    pub resolved_at: DateTime<Utc>,
}

/// Metadata record for one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub episode_id: String,
    /// Source that produced the record (the winning source after a merge)
    pub data_source: String,
    pub last_updated: DateTime<Utc>,
    pub validated: bool,
    /// Confidence score (0.0-1.0)
    pub confidence_score: f64,
    pub schema_version: u32,
    pub enrichment_status: EnrichmentStatus,
    /// Extracted episode fields, ordered by name
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_validation: Option<BTreeMap<String, FieldValidation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolution: Option<Vec<ConflictResolutionRecord>>,
}

impl EpisodeMetadata {
    /// Empty partial record attributed to `source`
    pub fn new(episode_id: impl Into<String>, source: impl Into<String>, confidence: f64) -> Self {
        Self {
            episode_id: episode_id.into(),
            data_source: source.into(),
            last_updated: Utc::now(),
            validated: false,
            confidence_score: confidence.clamp(0.0, 1.0),
            schema_version: METADATA_SCHEMA_VERSION,
            enrichment_status: EnrichmentStatus::Pending,
            fields: BTreeMap::new(),
            field_validation: None,
            conflict_resolution: None,
        }
    }

    /// Record a field extracted by `source`.
    ///
    /// The value is stored only when present and non-empty; the validation
    /// entry is written either way so consumers can see what was missing.
    pub fn set_field(&mut self, name: &str, value: Option<Value>, source: &str) {
        let value = value.filter(is_present);
        self.field_validation
            .get_or_insert_with(BTreeMap::new)
            .insert(
                name.to_string(),
                FieldValidation {
                    is_valid: value.is_some(),
                    source: source.to_string(),
                },
            );
        match value {
            Some(value) => {
                self.fields.insert(name.to_string(), value);
            }
            None => {
                self.fields.remove(name);
            }
        }
    }

    /// Value of a field, if present
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether a field holds a value that passed validation
    pub fn is_field_valid(&self, name: &str) -> bool {
        let validated = self
            .field_validation
            .as_ref()
            .and_then(|v| v.get(name))
            .map(|v| v.is_valid)
            .unwrap_or(true);
        validated && self.fields.get(name).map(is_present).unwrap_or(false)
    }

    /// Append an audit entry (history is never overwritten)
    pub fn push_resolution(&mut self, record: ConflictResolutionRecord) {
        self.conflict_resolution.get_or_insert_with(Vec::new).push(record);
    }

    /// Prepend the resolution history of an earlier record of this episode
    pub fn carry_history_from(&mut self, previous: &EpisodeMetadata) {
        let Some(history) = previous.conflict_resolution.as_ref() else {
            return;
        };
        let fresh = self.conflict_resolution.take().unwrap_or_default();
        self.conflict_resolution = Some(history.iter().cloned().chain(fresh).collect());
    }

    /// Recompute `validated` and `enrichment_status` from the field set
    pub fn refresh_status(&mut self) {
        let complete = fields::REQUIRED.iter().all(|f| self.is_field_valid(f));
        self.validated = complete;
        self.enrichment_status = if complete {
            EnrichmentStatus::Complete
        } else {
            EnrichmentStatus::Partial
        };
    }
}

/// A value counts as present when it is non-null and, for strings and
/// collections, non-empty.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}
