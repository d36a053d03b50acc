//! Conflict resolution for disagreeing field values
//!
//! Given source-attributed candidates for one field, a configurable strategy
//! picks a single value. Every decision is appended to the episode's
//! `conflict_resolution` history; a value is only written back when the
//! decision does not need manual review.
//!
//! # Strategies
//! - **highest-confidence**: top candidate by confidence
//! - **most-recent**: top candidate by timestamp
//! - **source-priority**: top candidate by position in `source_priority`
//! - **consensus**: largest group of equal values, else highest-confidence
//! - **manual**: never resolves; always flags for review

pub mod detector;

pub use detector::identify_field_conflicts;

use crate::types::{
    CandidateSnapshot, ConflictResolutionRecord, EpisodeMetadata, ResolutionStrategy,
    MEMORY_ALPHA_SOURCE_ID, TMDB_SOURCE_ID,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use vbs_common::events::{EventBus, VbsEvent};

/// One source's value for a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictingValue {
    pub source: String,
    pub value: Value,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// Source reliability weight (0.0-1.0)
    pub reliability: f64,
}

/// Everything needed to resolve one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictContext {
    pub episode_id: String,
    pub field_name: String,
    pub candidates: Vec<ConflictingValue>,
}

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictResolutionConfig {
    pub default_strategy: ResolutionStrategy,
    /// Per-field strategy overrides
    pub field_strategies: HashMap<String, ResolutionStrategy>,
    /// Confidence below which a decision needs manual review
    pub confidence_threshold: f64,
    /// Master switch for the confidence review gate
    pub require_manual_review: bool,
    /// Most trusted source first
    pub source_priority: Vec<String>,
}

impl Default for ConflictResolutionConfig {
    fn default() -> Self {
        Self {
            default_strategy: ResolutionStrategy::HighestConfidence,
            field_strategies: HashMap::new(),
            confidence_threshold: 0.8,
            require_manual_review: true,
            source_priority: vec![
                MEMORY_ALPHA_SOURCE_ID.to_string(),
                TMDB_SOURCE_ID.to_string(),
            ],
        }
    }
}

/// Partial configuration update; `None` leaves a setting unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictResolutionConfigUpdate {
    pub default_strategy: Option<ResolutionStrategy>,
    pub field_strategies: Option<HashMap<String, ResolutionStrategy>>,
    pub confidence_threshold: Option<f64>,
    pub require_manual_review: Option<bool>,
    pub source_priority: Option<Vec<String>>,
}

impl ConflictResolutionConfig {
    pub fn apply(&mut self, update: ConflictResolutionConfigUpdate) {
        if let Some(strategy) = update.default_strategy {
            self.default_strategy = strategy;
        }
        if let Some(strategies) = update.field_strategies {
            self.field_strategies = strategies;
        }
        if let Some(threshold) = update.confidence_threshold {
            self.confidence_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(review) = update.require_manual_review {
            self.require_manual_review = review;
        }
        if let Some(priority) = update.source_priority {
            self.source_priority = priority;
        }
    }

    /// Strategy for `field_name`: the override, else the default
    pub fn strategy_for(&self, field_name: &str) -> ResolutionStrategy {
        self.field_strategies
            .get(field_name)
            .copied()
            .unwrap_or(self.default_strategy)
    }
}

/// Outcome of resolving one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionResult {
    /// `None` when the field is left for manual review by the manual strategy
    pub resolved_value: Option<Value>,
    /// Strategy actually applied (consensus may fall back)
    pub strategy: ResolutionStrategy,
    pub confidence: f64,
    pub requires_manual_review: bool,
    pub reasoning: String,
    /// Candidates that did not win
    pub alternatives: Vec<ConflictingValue>,
    pub winning_source: Option<String>,
}

impl ConflictResolutionResult {
    fn manual(reasoning: impl Into<String>, alternatives: Vec<ConflictingValue>) -> Self {
        Self {
            resolved_value: None,
            strategy: ResolutionStrategy::Manual,
            confidence: 0.0,
            requires_manual_review: true,
            reasoning: reasoning.into(),
            alternatives,
            winning_source: None,
        }
    }
}

pub struct ConflictResolver {
    config: ConflictResolutionConfig,
    event_bus: EventBus,
}

impl ConflictResolver {
    pub fn new(config: ConflictResolutionConfig, event_bus: EventBus) -> Self {
        Self { config, event_bus }
    }

    pub fn config(&self) -> &ConflictResolutionConfig {
        &self.config
    }

    /// Merge a partial update into the configuration
    pub fn update_config(&mut self, update: ConflictResolutionConfigUpdate) {
        self.config.apply(update);
        info!(config = ?self.config, "Conflict resolution configuration updated");
    }

    /// Resolve one field with its configured strategy.
    ///
    /// Never fails: an empty candidate list yields the manual-review outcome.
    pub fn resolve_field_conflict(&self, context: &ConflictContext) -> ConflictResolutionResult {
        if context.candidates.is_empty() {
            return ConflictResolutionResult::manual(
                format!("No candidate values for {}", context.field_name),
                Vec::new(),
            );
        }

        let strategy = self.config.strategy_for(&context.field_name);
        let result = match strategy {
            ResolutionStrategy::HighestConfidence => self.highest_confidence(&context.candidates),
            ResolutionStrategy::MostRecent => self.most_recent(&context.candidates),
            ResolutionStrategy::SourcePriority => self.source_priority(&context.candidates),
            ResolutionStrategy::Consensus => self.consensus(&context.candidates),
            ResolutionStrategy::Manual => ConflictResolutionResult::manual(
                format!("{} is configured for manual review", context.field_name),
                context.candidates.clone(),
            ),
        };

        debug!(
            episode_id = %context.episode_id,
            field = %context.field_name,
            strategy = %result.strategy,
            requires_manual_review = result.requires_manual_review,
            "Field conflict resolved"
        );
        result
    }

    fn needs_review(&self, confidence: f64) -> bool {
        self.config.require_manual_review && confidence < self.config.confidence_threshold
    }

    /// Result for `candidates[winner]`, chosen by `strategy`
    fn pick(
        &self,
        candidates: &[ConflictingValue],
        winner: usize,
        strategy: ResolutionStrategy,
        requires_manual_review: bool,
        reasoning: String,
    ) -> ConflictResolutionResult {
        let chosen = &candidates[winner];
        ConflictResolutionResult {
            resolved_value: Some(chosen.value.clone()),
            strategy,
            confidence: chosen.confidence,
            requires_manual_review,
            reasoning,
            alternatives: candidates
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != winner)
                .map(|(_, c)| c.clone())
                .collect(),
            winning_source: Some(chosen.source.clone()),
        }
    }

    fn highest_confidence(&self, candidates: &[ConflictingValue]) -> ConflictResolutionResult {
        let winner = first_best(candidates, |a, b| a.confidence.total_cmp(&b.confidence));
        let chosen = &candidates[winner];
        self.pick(
            candidates,
            winner,
            ResolutionStrategy::HighestConfidence,
            self.needs_review(chosen.confidence),
            format!(
                "Selected value from {} with highest confidence {:.2}",
                chosen.source, chosen.confidence
            ),
        )
    }

    fn most_recent(&self, candidates: &[ConflictingValue]) -> ConflictResolutionResult {
        let winner = first_best(candidates, |a, b| a.timestamp.cmp(&b.timestamp));
        let chosen = &candidates[winner];
        self.pick(
            candidates,
            winner,
            ResolutionStrategy::MostRecent,
            self.needs_review(chosen.confidence),
            format!(
                "Selected most recent value from {} (updated {})",
                chosen.source,
                chosen.timestamp.to_rfc3339()
            ),
        )
    }

    fn source_priority(&self, candidates: &[ConflictingValue]) -> ConflictResolutionResult {
        let rank = |c: &ConflictingValue| {
            self.config
                .source_priority
                .iter()
                .position(|s| *s == c.source)
                .unwrap_or(usize::MAX)
        };
        // Lower rank wins, so compare reversed
        let winner = first_best(candidates, |a, b| rank(b).cmp(&rank(a)));
        let chosen = &candidates[winner];
        let reasoning = match rank(chosen) {
            usize::MAX => format!(
                "No candidate source is ranked; kept first candidate from {}",
                chosen.source
            ),
            position => format!(
                "Selected value from {} (source priority {})",
                chosen.source,
                position + 1
            ),
        };
        self.pick(
            candidates,
            winner,
            ResolutionStrategy::SourcePriority,
            false,
            reasoning,
        )
    }

    fn consensus(&self, candidates: &[ConflictingValue]) -> ConflictResolutionResult {
        // Groups of indices sharing a value, in first-seen order
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            match groups
                .iter()
                .position(|g| candidates[g[0]].value == candidate.value)
            {
                Some(group) => groups[group].push(index),
                None => groups.push(vec![index]),
            }
        }

        let mut largest = &groups[0];
        for group in &groups[1..] {
            if group.len() > largest.len() {
                largest = group;
            }
        }

        if largest.len() < 2 {
            let mut result = self.highest_confidence(candidates);
            result.reasoning = format!("No consensus; {}", result.reasoning);
            return result;
        }

        let confidence =
            largest.iter().map(|&i| candidates[i].confidence).sum::<f64>() / largest.len() as f64;
        let first = &candidates[largest[0]];
        let agreeing: Vec<&str> = largest
            .iter()
            .map(|&i| candidates[i].source.as_str())
            .collect();

        ConflictResolutionResult {
            resolved_value: Some(first.value.clone()),
            strategy: ResolutionStrategy::Consensus,
            confidence,
            requires_manual_review: self.needs_review(confidence),
            reasoning: format!(
                "{} of {} sources agree ({}), led by {}",
                largest.len(),
                candidates.len(),
                agreeing.join(", "),
                first.source
            ),
            alternatives: candidates
                .iter()
                .enumerate()
                .filter(|(i, _)| !largest.contains(i))
                .map(|(_, c)| c.clone())
                .collect(),
            winning_source: Some(first.source.clone()),
        }
    }

    /// Resolve every detected conflict against `partials` and record it on `record`.
    ///
    /// The resolved value is written only when no manual review is needed.
    /// Returns the number of conflicts processed.
    pub fn apply_conflicts(&self, record: &mut EpisodeMetadata, partials: &[EpisodeMetadata]) -> usize {
        let conflicts = identify_field_conflicts(partials);
        for context in &conflicts {
            let result = self.resolve_field_conflict(context);

            record.push_resolution(ConflictResolutionRecord {
                field_name: context.field_name.clone(),
                candidates: context
                    .candidates
                    .iter()
                    .map(|c| CandidateSnapshot {
                        source: c.source.clone(),
                        value: c.value.clone(),
                        confidence: c.confidence,
                    })
                    .collect(),
                resolved_value: result.resolved_value.clone(),
                strategy: result.strategy,
                requires_manual_review: result.requires_manual_review,
                resolved_at: Utc::now(),
            });

            if !result.requires_manual_review {
                if let (Some(value), Some(source)) =
                    (result.resolved_value.clone(), result.winning_source.as_deref())
                {
                    record.set_field(&context.field_name, Some(value), source);
                }
            }

            self.event_bus.emit_lossy(VbsEvent::ConflictResolved {
                episode_id: record.episode_id.clone(),
                field_name: context.field_name.clone(),
                strategy: result.strategy.to_string(),
                requires_manual_review: result.requires_manual_review,
                timestamp: Utc::now(),
            });
        }

        if !conflicts.is_empty() {
            record.refresh_status();
        }
        conflicts.len()
    }

    /// Resolve conflicts for every episode in `metadata`.
    ///
    /// `sources` maps an episode id to the source-attributed partial records
    /// it was built from; episodes without partials pass through unchanged.
    pub fn resolve_metadata_conflicts(
        &self,
        mut metadata: BTreeMap<String, EpisodeMetadata>,
        sources: &BTreeMap<String, Vec<EpisodeMetadata>>,
    ) -> BTreeMap<String, EpisodeMetadata> {
        let mut total = 0;
        for (episode_id, record) in metadata.iter_mut() {
            if let Some(partials) = sources.get(episode_id) {
                total += self.apply_conflicts(record, partials);
            }
        }
        info!(
            episodes = metadata.len(),
            conflicts = total,
            "Metadata conflicts resolved"
        );
        metadata
    }
}

/// Index of the greatest candidate under `cmp`; the earliest wins ties
fn first_best<F>(candidates: &[ConflictingValue], cmp: F) -> usize
where
    F: Fn(&ConflictingValue, &ConflictingValue) -> Ordering,
{
    let mut best = 0;
    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        if cmp(candidate, &candidates[best]) == Ordering::Greater {
            best = index;
        }
    }
    best
}
