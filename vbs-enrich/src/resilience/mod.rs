//! Resilience layer shared by every source adapter
//!
//! Rate limiting, circuit breaking, response caching and the retrying request
//! executor. One instance of each is owned by an orchestrator and shared by
//! all of its adapters.

pub mod cache;
pub mod executor;
pub mod health_monitor;
pub mod rate_limiter;
pub mod usage;

pub use cache::{cache_key, CacheStats, ResponseCache, DEFAULT_TTL};
pub use executor::{
    HttpRequest, HttpResponse, HttpTransport, RequestExecutor, ReqwestTransport, TransportError,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use health_monitor::{HealthMonitor, HealthStatus};
pub use rate_limiter::{RateLimiter, TokenBucket};
pub use usage::{SourceUsage, UsageTracker};
