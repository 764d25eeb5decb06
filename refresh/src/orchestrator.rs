//! Entry points deciding whether a data refresh should run.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::database::{DonorImportTrigger, DormantDatabaseLocator};
use crate::error::{ErrorKind, RefreshError, RefreshResult};
use crate::notification::{Notification, NotificationSender};
use crate::record::{RecordId, RefreshRecord};
use crate::runner::DataRefreshRunner;
use crate::store::BoxedHistoryStore;
use crate::version::VersionProvider;

/// Result of asking the orchestrator for a refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The active database already uses the latest nomenclature version.
    UpToDate,
    /// Another refresh is in progress, nothing was started.
    AlreadyInProgress,
    /// There was no interrupted refresh to continue.
    NothingToContinue,
    Succeeded { nomenclature_version: String },
    /// The refresh failed. The failure was logged, alerted and recorded.
    Failed(RefreshError),
    /// The refresh was stopped by shutdown, torn down, recorded as failed and alerted.
    Cancelled,
}

/// Decides when a data refresh starts and records its outcome.
///
/// None of the entry points return errors. Failures are logged, sent as high priority
/// notifications and reported through [`RefreshOutcome::Failed`].
#[derive(Clone)]
pub struct DataRefreshOrchestrator {
    store: BoxedHistoryStore,
    version_provider: Arc<dyn VersionProvider>,
    dormant_locator: Arc<dyn DormantDatabaseLocator>,
    import_trigger: Arc<dyn DonorImportTrigger>,
    notification_sender: Arc<dyn NotificationSender>,
    runner: DataRefreshRunner,
}

impl DataRefreshOrchestrator {
    pub fn new(
        store: BoxedHistoryStore,
        version_provider: Arc<dyn VersionProvider>,
        dormant_locator: Arc<dyn DormantDatabaseLocator>,
        import_trigger: Arc<dyn DonorImportTrigger>,
        notification_sender: Arc<dyn NotificationSender>,
        runner: DataRefreshRunner,
    ) -> Self {
        Self {
            store,
            version_provider,
            dormant_locator,
            import_trigger,
            notification_sender,
            runner,
        }
    }

    /// Starts a refresh if a newer nomenclature version was published and none is running.
    pub async fn refresh_data_if_necessary(&self, shutdown_rx: ShutdownRx) -> RefreshOutcome {
        let versions = async {
            let latest = self.version_provider.get_latest_version().await?;
            let active = self.version_provider.get_active_version().await?;

            Ok::<_, RefreshError>((latest, active))
        };

        let (latest, active) = match versions.await {
            Ok(versions) => versions,
            Err(err) => return self.fail("Failed to determine nomenclature versions", err).await,
        };

        if latest == active {
            info!(nomenclature_version = %active, "active database is up to date, no data refresh needed");
            return RefreshOutcome::UpToDate;
        }

        info!(
            active_version = %active,
            latest_version = %latest,
            "newer nomenclature version available"
        );

        self.start_refresh(latest, shutdown_rx).await
    }

    /// Starts a refresh at the latest version even when the active database already uses it.
    pub async fn force_refresh(&self, shutdown_rx: ShutdownRx) -> RefreshOutcome {
        let latest = match self.version_provider.get_latest_version().await {
            Ok(latest) => latest,
            Err(err) => {
                return self
                    .fail("Failed to determine the latest nomenclature version", err)
                    .await;
            }
        };

        info!(nomenclature_version = %latest, "forcing data refresh");

        self.start_refresh(latest, shutdown_rx).await
    }

    /// Continues the refresh left in progress by a previous process.
    pub async fn continue_refresh(&self, shutdown_rx: ShutdownRx) -> RefreshOutcome {
        let in_progress = match self.store.get_in_progress_records().await {
            Ok(records) => records,
            Err(err) => return self.fail("Failed to load in progress data refreshes", err).await,
        };

        let Some(record) = in_progress.into_iter().next() else {
            info!("no interrupted data refresh to continue");
            return RefreshOutcome::NothingToContinue;
        };

        info!(
            record_id = %record.id,
            nomenclature_version = %record.nomenclature_version,
            completed_stages = ?record.completed_stages,
            "continuing interrupted data refresh"
        );

        self.run(record.id, shutdown_rx).await
    }

    async fn start_refresh(
        &self,
        nomenclature_version: String,
        shutdown_rx: ShutdownRx,
    ) -> RefreshOutcome {
        match self.store.get_in_progress_records().await {
            Ok(records) if !records.is_empty() => {
                info!(
                    record_id = %records[0].id,
                    "data refresh already in progress, not starting another one"
                );
                return RefreshOutcome::AlreadyInProgress;
            }
            Ok(_) => {}
            Err(err) => return self.fail("Failed to load in progress data refreshes", err).await,
        }

        let record_id = match self.create_record(nomenclature_version).await {
            Ok(record_id) => record_id,
            Err(err) if err.kind() == ErrorKind::InvalidState => {
                info!(error = %err, "data refresh was started concurrently, not starting another one");
                return RefreshOutcome::AlreadyInProgress;
            }
            Err(err) => return self.fail("Failed to create data refresh record", err).await,
        };

        self.run(record_id, shutdown_rx).await
    }

    async fn create_record(&self, nomenclature_version: String) -> RefreshResult<RecordId> {
        let target_database = self.dormant_locator.get_dormant_database_name().await?;
        let record = RefreshRecord::new(target_database, nomenclature_version);

        info!(
            record_id = %record.id,
            target_database = %record.target_database,
            nomenclature_version = %record.nomenclature_version,
            "data refresh record created"
        );

        self.store.create(record).await
    }

    /// Runs the refresh for `record_id` with differential donor imports paused.
    async fn run(&self, record_id: RecordId, shutdown_rx: ShutdownRx) -> RefreshOutcome {
        if let Err(err) = self.import_trigger.disable().await {
            self.mark_failed(record_id).await;
            return self
                .fail("Failed to disable the donor import trigger", err)
                .await;
        }

        let result = self.runner.refresh_record(record_id, shutdown_rx).await;

        if let Err(err) = self.import_trigger.enable().await {
            error!(error = %err, "failed to re-enable the donor import trigger");
            self.notify(Notification::high(
                "Donor import trigger could not be re-enabled",
                format!("Differential donor imports stay paused until the trigger is enabled manually. Error: {err}"),
            ))
            .await;
        }

        match result {
            Ok(nomenclature_version) => {
                if let Err(err) = self.store.mark_finished(record_id, true).await {
                    error!(
                        record_id = %record_id,
                        error = %err,
                        "failed to mark the data refresh as succeeded"
                    );
                }

                info!(
                    record_id = %record_id,
                    nomenclature_version = %nomenclature_version,
                    "data refresh succeeded"
                );
                self.notify(Notification::low(
                    "Data refresh succeeded",
                    format!("The dormant database was refreshed to nomenclature version {nomenclature_version}."),
                ))
                .await;

                RefreshOutcome::Succeeded {
                    nomenclature_version,
                }
            }
            Err(err) if err.is_cancellation() => {
                warn!(record_id = %record_id, "data refresh cancelled");
                self.mark_failed(record_id).await;
                self.notify(Notification::high(
                    "Data refresh cancelled",
                    format!(
                        "The data refresh {record_id} was stopped by a shutdown request and has to be \
                         started again. Error: {err}"
                    ),
                ))
                .await;

                RefreshOutcome::Cancelled
            }
            Err(err) => {
                self.mark_failed(record_id).await;
                self.fail("Data refresh failed", err).await
            }
        }
    }

    async fn mark_failed(&self, record_id: RecordId) {
        if let Err(err) = self.store.mark_finished(record_id, false).await {
            error!(
                record_id = %record_id,
                error = %err,
                "failed to mark the data refresh as failed"
            );
        }
    }

    /// Logs and alerts a failure and turns it into an outcome.
    async fn fail(&self, summary: &'static str, err: RefreshError) -> RefreshOutcome {
        error!(error = %err, "{summary}");
        self.notify(Notification::high(summary, err.to_string()))
            .await;

        RefreshOutcome::Failed(err)
    }

    async fn notify(&self, notification: Notification) {
        if let Err(err) = self.notification_sender.send(notification).await {
            error!(error = %err, "failed to send notification");
        }
    }
}
