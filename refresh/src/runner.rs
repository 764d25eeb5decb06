//! Execution of the ordered data refresh stages.
//!
//! The runner owns a single refresh attempt from loading its history record to either finishing
//! every stage or tearing the expensive resources down again. Whether a refresh should happen at
//! all is decided by [`crate::orchestrator::DataRefreshOrchestrator`].

use std::sync::Arc;

use config::shared::RefreshConfig;
use tracing::{debug, error, info, warn};

use crate::bail;
use crate::concurrency::shutdown::ShutdownRx;
use crate::database::{DatabaseSizeController, DormantDatabaseLocator};
use crate::error::{ErrorKind, RefreshResult};
use crate::failpoints::{
    COMPENSATE__BEFORE_RESIZE, RUN_STAGE__BEFORE_RECORD, RUN_STAGE__BEFORE_WORKER,
    refresh_fail_point,
};
use crate::notification::{Notification, NotificationSender};
use crate::record::{RecordId, RefreshRecord};
use crate::stage::{RefreshStage, StageAction, StagePlan};
use crate::store::BoxedHistoryStore;
use crate::version::VersionProvider;
use crate::workers::base::StageWorkers;
use crate::workers::heartbeat::HeartbeatWorker;

pub(crate) const TEARDOWN_FAILED_SUMMARY: &str = "Data refresh teardown failed";

/// Runs the stages of a data refresh against the dormant database.
#[derive(Clone)]
pub struct DataRefreshRunner {
    config: RefreshConfig,
    store: BoxedHistoryStore,
    version_provider: Arc<dyn VersionProvider>,
    dormant_locator: Arc<dyn DormantDatabaseLocator>,
    size_controller: Arc<dyn DatabaseSizeController>,
    workers: StageWorkers,
    notification_sender: Arc<dyn NotificationSender>,
}

impl DataRefreshRunner {
    pub fn new(
        config: RefreshConfig,
        store: BoxedHistoryStore,
        version_provider: Arc<dyn VersionProvider>,
        dormant_locator: Arc<dyn DormantDatabaseLocator>,
        size_controller: Arc<dyn DatabaseSizeController>,
        workers: StageWorkers,
        notification_sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            config,
            store,
            version_provider,
            dormant_locator,
            size_controller,
            workers,
            notification_sender,
        }
    }

    /// Refreshes the dormant database and returns the nomenclature version it was built with.
    ///
    /// Resumes the record in progress if there is one, otherwise starts a new one. Stages
    /// completed by an earlier run are not repeated.
    ///
    /// On failure the target database is scaled back to the dormant tier, the record is finished
    /// as failed and the original error is returned. When `shutdown_rx` fires the run stops at the
    /// next stage boundary and is torn down the same way, returning
    /// [`ErrorKind::RefreshCancelled`].
    pub async fn refresh_data(&self, shutdown_rx: ShutdownRx) -> RefreshResult<String> {
        let record = self.load_record().await?;

        self.run(record, shutdown_rx).await
    }

    /// Refreshes the record with `record_id`, which has to be in progress.
    ///
    /// Fails with [`ErrorKind::RecordNotFound`] or [`ErrorKind::InvalidState`] before any stage
    /// runs when the record is missing or already finished.
    pub async fn refresh_record(
        &self,
        record_id: RecordId,
        shutdown_rx: ShutdownRx,
    ) -> RefreshResult<String> {
        let Some(record) = self.store.get_record(record_id).await? else {
            bail!(
                ErrorKind::RecordNotFound,
                "Data refresh record not found",
                format!("No data refresh record with id {record_id} exists")
            );
        };

        if !record.is_in_progress() {
            bail!(
                ErrorKind::InvalidState,
                "Data refresh record is already finished",
                format!("The data refresh {record_id} was finished before it could run")
            );
        }

        self.resume_record(&record).await?;

        self.run(record, shutdown_rx).await
    }

    async fn run(
        &self,
        mut record: RefreshRecord,
        shutdown_rx: ShutdownRx,
    ) -> RefreshResult<String> {
        info!(
            record_id = %record.id,
            target_database = %record.target_database,
            nomenclature_version = %record.nomenclature_version,
            completed_stages = record.completed_stages.len(),
            "starting data refresh"
        );

        let heartbeat = HeartbeatWorker::start(
            record.id,
            self.store.clone(),
            self.config.heartbeat_interval(),
        );
        let result = self.run_stages(&mut record, &shutdown_rx).await;
        heartbeat.stop().await;

        let err = match result {
            Ok(()) => {
                info!(
                    record_id = %record.id,
                    nomenclature_version = %record.nomenclature_version,
                    "data refresh stages completed"
                );

                return Ok(record.nomenclature_version);
            }
            Err(err) => err,
        };

        if err.is_cancellation() {
            warn!(record_id = %record.id, "data refresh cancelled, tearing it down");
        } else {
            error!(record_id = %record.id, error = %err, "data refresh failed");
        }

        self.compensate(&record).await;
        if let Err(finish_err) = self.store.mark_finished(record.id, false).await {
            error!(
                record_id = %record.id,
                error = %finish_err,
                "failed to mark the failed data refresh as finished"
            );
        }

        Err(err)
    }

    /// Loads the record to work on, creating a new one when nothing is in progress.
    async fn load_record(&self) -> RefreshResult<RefreshRecord> {
        match self.store.get_current_record().await? {
            Some(record) if record.is_in_progress() => {
                self.resume_record(&record).await?;

                Ok(record)
            }
            _ => {
                let nomenclature_version = self.version_provider.get_latest_version().await?;
                let target_database = self.dormant_locator.get_dormant_database_name().await?;

                let record = RefreshRecord::new(target_database, nomenclature_version);
                self.store.create(record.clone()).await?;

                Ok(record)
            }
        }
    }

    async fn resume_record(&self, record: &RefreshRecord) -> RefreshResult<()> {
        if record.completed_stages.is_empty() {
            return self.store.record_heartbeat(record.id).await;
        }

        info!(
            record_id = %record.id,
            completed_stages = ?record.completed_stages,
            "continuing interrupted data refresh"
        );

        self.store.mark_continued(record.id).await
    }

    async fn run_stages(
        &self,
        record: &mut RefreshRecord,
        shutdown_rx: &ShutdownRx,
    ) -> RefreshResult<()> {
        let plan = StagePlan::for_completed_stages(&record.completed_stages);

        for &(stage, action) in plan.steps() {
            if action == StageAction::Skip {
                debug!(record_id = %record.id, %stage, "skipping stage");
                continue;
            }

            if shutdown_rx.is_shutdown() {
                bail!(
                    ErrorKind::RefreshCancelled,
                    "Data refresh cancelled",
                    format!("Shutdown was requested before stage '{stage}'")
                );
            }

            info!(record_id = %record.id, %stage, "running stage");

            refresh_fail_point(RUN_STAGE__BEFORE_WORKER)?;
            self.execute_stage(stage, record, plan.is_hla_continuation())
                .await?;
            refresh_fail_point(RUN_STAGE__BEFORE_RECORD)?;

            self.store.mark_stage_complete(record.id, stage).await?;
            record.completed_stages.insert(stage);

            info!(record_id = %record.id, %stage, "stage completed");
        }

        Ok(())
    }

    async fn execute_stage(
        &self,
        stage: RefreshStage,
        record: &RefreshRecord,
        is_hla_continuation: bool,
    ) -> RefreshResult<()> {
        let version = record.nomenclature_version.as_str();
        let target = record.target_database.as_str();

        match stage {
            RefreshStage::ScaleUp => {
                self.size_controller
                    .resize(target, &self.config.refresh_tier)
                    .await
            }
            RefreshStage::RebuildMetadataDictionary => self.workers.metadata.rebuild(version).await,
            RefreshStage::RemoveIndexes => self.workers.indexes.remove().await,
            RefreshStage::DeleteDonorData => self.workers.donor_data.delete_all().await,
            RefreshStage::ImportDonors => {
                // A previous attempt may have imported part of the donors before dying.
                self.workers.donor_data.delete_all().await?;
                self.workers.donor_import.import_all().await
            }
            RefreshStage::ProcessDonorHla => {
                self.workers
                    .hla
                    .process(version, is_hla_continuation)
                    .await
            }
            RefreshStage::RecreateIndexes => self.workers.indexes.create().await,
            RefreshStage::ScaleDown => {
                self.size_controller
                    .resize(target, &self.config.active_tier)
                    .await
            }
            RefreshStage::ReplayQueuedDonorUpdates => {
                self.workers.queued_updates.replay_during_refresh().await
            }
        }
    }

    /// Scales the target database down to the dormant tier after a failed or cancelled run.
    ///
    /// Failures are logged and alerted but never returned, so that the caller still sees the
    /// error that aborted the run.
    async fn compensate(&self, record: &RefreshRecord) {
        info!(
            record_id = %record.id,
            target_database = %record.target_database,
            tier = %self.config.dormant_tier,
            "scaling target database down after failed data refresh"
        );

        let result = match refresh_fail_point(COMPENSATE__BEFORE_RESIZE) {
            Ok(()) => {
                self.size_controller
                    .resize(&record.target_database, &self.config.dormant_tier)
                    .await
            }
            Err(err) => Err(err),
        };

        let Err(err) = result else {
            return;
        };

        error!(
            record_id = %record.id,
            target_database = %record.target_database,
            error = %err,
            "failed to scale target database down, it may still be running at the refresh tier"
        );

        let notification = Notification::high(
            TEARDOWN_FAILED_SUMMARY,
            format!(
                "Database '{}' could not be scaled down to tier '{}' after a failed data refresh \
                 and needs to be scaled down manually. Error: {err}",
                record.target_database, self.config.dormant_tier
            ),
        );
        if let Err(send_err) = self.notification_sender.send(notification).await {
            error!(error = %send_err, "failed to send teardown failure notification");
        }
    }
}

