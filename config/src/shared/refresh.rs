use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings driving a single data refresh run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Tier the dormant database is scaled to while the expensive stages run.
    pub refresh_tier: String,
    /// Serving tier the refreshed database is left at once the data stages are done.
    pub active_tier: String,
    /// Lowest-cost tier used when tearing a failed or abandoned refresh down.
    pub dormant_tier: String,
    /// Interval in milliseconds between heartbeats written to the running refresh record.
    ///
    /// Default: 60000 (1 minute)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Age in milliseconds after which an unfinished record without a heartbeat is considered
    /// abandoned by the cleanup service.
    ///
    /// Default: 900000 (15 minutes)
    #[serde(default = "default_stale_heartbeat_timeout_ms")]
    pub stale_heartbeat_timeout_ms: u64,
}

impl RefreshConfig {
    pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 60_000;

    pub const DEFAULT_STALE_HEARTBEAT_TIMEOUT_MS: u64 = 900_000;

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn stale_heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_heartbeat_timeout_ms)
    }

    /// Validates tier names and heartbeat timings.
    ///
    /// The stale timeout must exceed the heartbeat interval, otherwise a healthy run could be
    /// torn down by the cleanup service.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.refresh_tier.trim().is_empty() {
            return Err(ValidationError::EmptyTier("refresh_tier"));
        }
        if self.active_tier.trim().is_empty() {
            return Err(ValidationError::EmptyTier("active_tier"));
        }
        if self.dormant_tier.trim().is_empty() {
            return Err(ValidationError::EmptyTier("dormant_tier"));
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "heartbeat_interval_ms",
                constraint: "must be greater than zero",
            });
        }

        if self.stale_heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "stale_heartbeat_timeout_ms",
                constraint: "must be greater than heartbeat_interval_ms",
            });
        }

        Ok(())
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    RefreshConfig::DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_stale_heartbeat_timeout_ms() -> u64 {
    RefreshConfig::DEFAULT_STALE_HEARTBEAT_TIMEOUT_MS
}
