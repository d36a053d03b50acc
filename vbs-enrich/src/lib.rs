//! vbs-enrich library interface
//!
//! Episode metadata enrichment: per-source rate limiting and circuit
//! breaking, cached and retried HTTP lookups against Memory Alpha and TMDB,
//! and policy-driven resolution of disagreeing field values.

pub mod config;
pub mod conflict;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod resilience;
pub mod sources;
pub mod types;

pub use crate::config::{EnrichmentConfig, MergeMode};
pub use crate::conflict::{
    identify_field_conflicts, ConflictContext, ConflictResolutionConfig,
    ConflictResolutionConfigUpdate, ConflictResolutionResult, ConflictResolver, ConflictingValue,
};
pub use crate::error::{EnrichmentError, EnrichmentResult, ErrorCategory};
pub use crate::orchestrator::{BatchReport, EnrichmentOrchestrator};
pub use crate::types::{
    EnrichmentStatus, EpisodeId, EpisodeMetadata, EpisodeRequest, MetadataSource,
    ResolutionStrategy,
};
