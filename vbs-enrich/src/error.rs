//! Error types for vbs-enrich
//!
//! Every pipeline error carries an [`ErrorCategory`], which alone decides
//! whether the request executor retries it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use vbs_common::events::SourceFailure;

/// Error classification used for retry decisions and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Transport-level failure (connection refused, DNS, reset)
    Network,
    /// HTTP 429
    RateLimit,
    /// Request aborted after the request timeout
    Timeout,
    /// HTTP 502/503/504, or the source's circuit breaker is open
    ServiceUnavailable,
    /// HTTP 401
    Authentication,
    /// HTTP 403
    QuotaExceeded,
    /// Response body unusable, or request input malformed
    DataFormat,
    /// Anything unclassified
    Unknown,
}

impl ErrorCategory {
    /// Whether a request failing with this category may be retried
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Network
                | ErrorCategory::RateLimit
                | ErrorCategory::Timeout
                | ErrorCategory::ServiceUnavailable
        )
    }

    /// Categorize a non-2xx HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCategory::Authentication,
            403 => ErrorCategory::QuotaExceeded,
            429 => ErrorCategory::RateLimit,
            502..=504 => ErrorCategory::ServiceUnavailable,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Kebab-case tag (e.g. "rate-limit")
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::RateLimit => "rate-limit",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ServiceUnavailable => "service-unavailable",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::QuotaExceeded => "quota-exceeded",
            ErrorCategory::DataFormat => "data-format",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enrichment pipeline error
#[derive(Debug, Clone, Error)]
pub enum EnrichmentError {
    /// An HTTP exchange failed (after categorization)
    #[error("{category} error from {source_id}: {message}")]
    Request {
        source_id: String,
        category: ErrorCategory,
        status: Option<u16>,
        message: String,
    },

    /// Source exists but is disabled in configuration
    #[error("Source {0} is disabled")]
    SourceDisabled(String),

    /// Circuit breaker is open for the source
    #[error("Source {source_id} is unhealthy after {consecutive_failures} consecutive failures")]
    SourceUnhealthy {
        source_id: String,
        consecutive_failures: u32,
    },

    /// Source identifier is not configured
    #[error("Unknown metadata source: {0}")]
    UnknownSource(String),

    /// Episode identifier does not match `<series>_s<season>_e<episode>`
    #[error("Invalid episode id format: {0}")]
    InvalidEpisodeId(String),

    /// Series code has no known mapping
    #[error("Unknown series code: {0}")]
    UnknownSeries(String),

    /// Response parsed, but held nothing usable
    #[error("Unusable response from {source_id}: {message}")]
    DataFormat { source_id: String, message: String },
}

impl EnrichmentError {
    /// Build a request error from a non-2xx HTTP status
    pub fn from_status(source_id: &str, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        EnrichmentError::Request {
            source_id: source_id.to_string(),
            category: ErrorCategory::from_status(status),
            status: Some(status),
            message: format!("HTTP {}: {}", status, snippet),
        }
    }

    /// Build a request error of a given category without an HTTP status
    pub fn request(source_id: &str, category: ErrorCategory, message: impl Into<String>) -> Self {
        EnrichmentError::Request {
            source_id: source_id.to_string(),
            category,
            status: None,
            message: message.into(),
        }
    }

    /// Build a data-format error
    pub fn data_format(source_id: &str, message: impl Into<String>) -> Self {
        EnrichmentError::DataFormat {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }

    /// Category tag of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            EnrichmentError::Request { category, .. } => *category,
            EnrichmentError::SourceUnhealthy { .. } => ErrorCategory::ServiceUnavailable,
            EnrichmentError::InvalidEpisodeId(_)
            | EnrichmentError::UnknownSeries(_)
            | EnrichmentError::DataFormat { .. } => ErrorCategory::DataFormat,
            EnrichmentError::SourceDisabled(_) | EnrichmentError::UnknownSource(_) => {
                ErrorCategory::Unknown
            }
        }
    }

    /// Whether the executor may retry after this error
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Source the error is attributed to, when known
    pub fn source_id(&self) -> Option<&str> {
        match self {
            EnrichmentError::Request { source_id, .. }
            | EnrichmentError::SourceUnhealthy { source_id, .. }
            | EnrichmentError::DataFormat { source_id, .. } => Some(source_id),
            EnrichmentError::SourceDisabled(id) | EnrichmentError::UnknownSource(id) => Some(id),
            EnrichmentError::InvalidEpisodeId(_) | EnrichmentError::UnknownSeries(_) => None,
        }
    }

    /// Event payload describing this error for `source_id`
    pub fn to_failure(&self, source_id: &str) -> SourceFailure {
        SourceFailure {
            source_id: source_id.to_string(),
            category: self.category().as_str().to_string(),
            retryable: self.is_retryable(),
            message: self.to_string(),
        }
    }
}

/// Result type for enrichment operations
pub type EnrichmentResult<T> = Result<T, EnrichmentError>;
