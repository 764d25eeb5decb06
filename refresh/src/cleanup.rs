//! Recovery of refreshes whose process died before it could tear down after itself.

use std::sync::Arc;

use chrono::Utc;
use config::shared::RefreshConfig;
use tracing::{error, info, warn};

use crate::database::{DatabaseSizeController, DonorImportTrigger};
use crate::notification::{Notification, NotificationSender};
use crate::record::{RecordId, RefreshRecord};
use crate::runner::TEARDOWN_FAILED_SUMMARY;
use crate::store::BoxedHistoryStore;

/// What a cleanup pass did with the records it found in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Records that were torn down and finished as failed.
    pub cleaned_up: Vec<RecordId>,
    /// Records skipped because their run is still sending heartbeats.
    pub skipped: Vec<RecordId>,
    /// Records that could not be torn down and are left in progress.
    pub failed: Vec<RecordId>,
}

impl CleanupOutcome {
    pub fn is_noop(&self) -> bool {
        self.cleaned_up.is_empty() && self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Administrative entry point for cleaning up after a refresh whose process crashed.
///
/// A crashed run never reaches its own compensation, so its target database may still be running
/// at the expensive refresh tier and differential imports may still be paused.
#[derive(Clone)]
pub struct DataRefreshCleanupService {
    config: RefreshConfig,
    store: BoxedHistoryStore,
    size_controller: Arc<dyn DatabaseSizeController>,
    import_trigger: Arc<dyn DonorImportTrigger>,
    notification_sender: Arc<dyn NotificationSender>,
}

impl DataRefreshCleanupService {
    pub fn new(
        config: RefreshConfig,
        store: BoxedHistoryStore,
        size_controller: Arc<dyn DatabaseSizeController>,
        import_trigger: Arc<dyn DonorImportTrigger>,
        notification_sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            config,
            store,
            size_controller,
            import_trigger,
            notification_sender,
        }
    }

    /// Cleans up every in-progress record whose run stopped sending heartbeats.
    pub async fn run_data_refresh_cleanup(&self) -> CleanupOutcome {
        self.cleanup(false).await
    }

    /// Cleans up every in-progress record regardless of its heartbeat.
    ///
    /// Only safe when an operator confirmed that no process is working on the records.
    pub async fn run_forced_data_refresh_cleanup(&self) -> CleanupOutcome {
        self.cleanup(true).await
    }

    async fn cleanup(&self, force: bool) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        let records = match self.store.get_in_progress_records().await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "failed to load in progress data refreshes for cleanup");
                self.notify(Notification::high(
                    "Data refresh cleanup failed",
                    format!("In progress data refreshes could not be loaded. Error: {err}"),
                ))
                .await;

                return outcome;
            }
        };

        if records.is_empty() {
            info!("no data refresh in progress, nothing to clean up");
            return outcome;
        }

        let timeout = chrono::Duration::from_std(self.config.stale_heartbeat_timeout())
            .unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();

        for record in records {
            if !force && !record.is_stale(now, timeout) {
                warn!(
                    record_id = %record.id,
                    last_seen_alive_at = %record.last_seen_alive_at(),
                    "data refresh is still sending heartbeats, skipping cleanup"
                );
                outcome.skipped.push(record.id);
                continue;
            }

            if self.cleanup_record(&record).await {
                outcome.cleaned_up.push(record.id);
            } else {
                outcome.failed.push(record.id);
            }
        }

        outcome
    }

    /// Tears down a single abandoned record and returns whether it was finished.
    async fn cleanup_record(&self, record: &RefreshRecord) -> bool {
        warn!(
            record_id = %record.id,
            target_database = %record.target_database,
            completed_stages = ?record.completed_stages,
            "cleaning up interrupted data refresh"
        );

        self.notify(Notification::high(
            "Data refresh was interrupted",
            format!(
                "The data refresh {} targeting '{}' stopped after the stages {:?} without tearing down. \
                 It is being cleaned up and will have to be started again.",
                record.id, record.target_database, record.completed_stages
            ),
        ))
        .await;

        if let Err(err) = self
            .size_controller
            .resize(&record.target_database, &self.config.dormant_tier)
            .await
        {
            error!(
                record_id = %record.id,
                target_database = %record.target_database,
                error = %err,
                "failed to scale down database of interrupted data refresh"
            );
            self.notify(Notification::high(
                TEARDOWN_FAILED_SUMMARY,
                format!(
                    "Database '{}' could not be scaled down to tier '{}'. The refresh record is left \
                     in progress so that cleanup can be retried. Error: {err}",
                    record.target_database, self.config.dormant_tier
                ),
            ))
            .await;

            return false;
        }

        if let Err(err) = self.import_trigger.enable().await {
            error!(error = %err, "failed to re-enable the donor import trigger during cleanup");
            self.notify(Notification::high(
                "Donor import trigger could not be re-enabled",
                format!("Differential donor imports stay paused until the trigger is enabled manually. Error: {err}"),
            ))
            .await;
        }

        if let Err(err) = self.store.mark_finished(record.id, false).await {
            error!(
                record_id = %record.id,
                error = %err,
                "failed to mark interrupted data refresh as finished"
            );
            return false;
        }

        info!(record_id = %record.id, "interrupted data refresh cleaned up");

        true
    }

    async fn notify(&self, notification: Notification) {
        if let Err(err) = self.notification_sender.send(notification).await {
            error!(error = %err, "failed to send notification");
        }
    }
}
