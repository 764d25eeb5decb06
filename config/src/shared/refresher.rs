use serde::Deserialize;

use crate::shared::{
    HistoryStoreConfig, NotificationConfig, RefreshConfig, ScheduleConfig, ServicesConfig,
    ValidationError,
};

/// Complete configuration for the refresher service.
///
/// This intentionally does not implement `Serialize` to avoid leaking secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct RefresherConfig {
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub history_store: HistoryStoreConfig,
    pub services: ServicesConfig,
    /// Optional alert webhook, alerts are only logged when missing.
    #[serde(default)]
    pub notification: Option<NotificationConfig>,
}

impl RefresherConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.refresh.validate()?;
        self.schedule.validate()?;
        self.history_store.validate()
    }
}
