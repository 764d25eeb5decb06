use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Schedule of the periodic "refresh if necessary" check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between two checks.
    ///
    /// Default: 3600 (1 hour)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl ScheduleConfig {
    pub const DEFAULT_INTERVAL_SECS: u64 = 3_600;

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "interval_secs",
                constraint: "must be greater than zero",
            });
        }

        Ok(())
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: Self::DEFAULT_INTERVAL_SECS,
        }
    }
}

fn default_interval_secs() -> u64 {
    ScheduleConfig::DEFAULT_INTERVAL_SECS
}
