//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Wall-clock timestamp `duration` from now, saturating at the chrono range
pub fn after(duration: Duration) -> DateTime<Utc> {
    let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
    Utc::now().checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
