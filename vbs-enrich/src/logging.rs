//! Log filter setup
//!
//! The subscriber is installed before configuration is loaded so that
//! warnings raised while loading reach the log. The filter starts from
//! `RUST_LOG` (or `info`) and is narrowed to the configured `[logging] level`
//! afterwards, unless `RUST_LOG` was set.

use tracing::debug;
use tracing_subscriber::{reload, EnvFilter, Registry};
use vbs_common::{Error, Result};

/// Filter used until the configuration is known
pub const STARTUP_LEVEL: &str = "info";

/// Handle to the installed filter
pub struct LogFilter {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

/// Reloadable filter layer for the root of a `tracing_subscriber::registry()`
pub fn filter_layer() -> (reload::Layer<EnvFilter, Registry>, LogFilter) {
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (layer, handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(STARTUP_LEVEL)));
    (layer, LogFilter { handle, from_env })
}

impl LogFilter {
    /// Switch to the configured level. `RUST_LOG`, when set, keeps precedence.
    ///
    /// Returns whether the filter changed.
    ///
    /// # Errors
    /// `Error::Config` when `level` is not a valid filter directive.
    pub fn apply_config_level(&self, level: &str) -> Result<bool> {
        if self.from_env {
            debug!("RUST_LOG set, ignoring configured log level");
            return Ok(false);
        }
        let filter = EnvFilter::try_new(level)
            .map_err(|e| Error::Config(format!("invalid logging level {:?}: {}", level, e)))?;
        self.handle
            .reload(filter)
            .map_err(|e| Error::Config(format!("log filter reload failed: {}", e)))?;
        Ok(true)
    }
}
