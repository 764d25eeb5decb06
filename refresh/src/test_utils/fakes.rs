use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::concurrency::shutdown::ShutdownTx;
use crate::database::{DatabaseSizeController, DonorImportTrigger, DormantDatabaseLocator};
use crate::error::{ErrorKind, RefreshResult};
use crate::notification::{Notification, NotificationSender, Priority};
use crate::test_utils::notify::TimedNotify;
use crate::version::VersionProvider;
use crate::workers::base::{
    DonorDataWorker, DonorImportWorker, HlaWorker, IndexWorker, MetadataWorker,
    QueuedUpdateWorker, StageWorkers,
};
use crate::{bail, refresh_error};

/// A collaborator method that can be made to fail or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeMethod {
    GetActiveVersion,
    GetLatestVersion,
    GetDormantDatabaseName,
    Resize,
    RebuildMetadata,
    RemoveIndexes,
    CreateIndexes,
    DeleteAllDonors,
    ImportAllDonors,
    ProcessHla,
    ReplayQueuedUpdates,
    EnableImportTrigger,
    DisableImportTrigger,
    SendNotification,
}

/// A call made to one of the fake collaborators.
///
/// Version and dormant database lookups are not recorded since they have no side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resize { database: String, tier: String },
    RebuildMetadata { nomenclature_version: String },
    RemoveIndexes,
    CreateIndexes,
    DeleteAllDonors,
    ImportAllDonors,
    ProcessHla {
        nomenclature_version: String,
        is_continuation: bool,
    },
    ReplayQueuedUpdates,
    EnableImportTrigger,
    DisableImportTrigger,
    Notify(Notification),
}

impl Call {
    pub fn resize(database: &str, tier: &str) -> Self {
        Call::Resize {
            database: database.to_owned(),
            tier: tier.to_owned(),
        }
    }

    fn method(&self) -> FakeMethod {
        match self {
            Call::Resize { .. } => FakeMethod::Resize,
            Call::RebuildMetadata { .. } => FakeMethod::RebuildMetadata,
            Call::RemoveIndexes => FakeMethod::RemoveIndexes,
            Call::CreateIndexes => FakeMethod::CreateIndexes,
            Call::DeleteAllDonors => FakeMethod::DeleteAllDonors,
            Call::ImportAllDonors => FakeMethod::ImportAllDonors,
            Call::ProcessHla { .. } => FakeMethod::ProcessHla,
            Call::ReplayQueuedUpdates => FakeMethod::ReplayQueuedUpdates,
            Call::EnableImportTrigger => FakeMethod::EnableImportTrigger,
            Call::DisableImportTrigger => FakeMethod::DisableImportTrigger,
            Call::Notify(_) => FakeMethod::SendNotification,
        }
    }
}

/// A call that waits until the test releases it.
#[derive(Debug, Clone)]
pub struct BlockedCall {
    /// Notified when the call has been entered.
    pub reached: TimedNotify,
    release: Arc<Notify>,
}

impl BlockedCall {
    /// Lets the blocked call complete.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

struct Inner {
    active_version: String,
    latest_version: String,
    dormant_database: String,
    calls: Vec<Call>,
    failing_methods: HashSet<FakeMethod>,
    failing_resize_tiers: HashSet<String>,
    blocked_methods: Vec<(FakeMethod, Arc<Notify>, Arc<Notify>)>,
    shutdown_on_call: Option<(FakeMethod, ShutdownTx)>,
}

/// Fake implementation of every collaborator of the data refresh pipeline.
///
/// Every side-effecting call is appended to a shared, ordered call log before it fails or
/// succeeds, so tests can assert on attempts as well as on successes.
#[derive(Clone)]
pub struct FakeServices {
    inner: Arc<Mutex<Inner>>,
}

impl FakeServices {
    pub fn new(
        active_version: impl Into<String>,
        latest_version: impl Into<String>,
        dormant_database: impl Into<String>,
    ) -> Self {
        let inner = Inner {
            active_version: active_version.into(),
            latest_version: latest_version.into(),
            dormant_database: dormant_database.into(),
            calls: Vec::new(),
            failing_methods: HashSet::new(),
            failing_resize_tiers: HashSet::new(),
            blocked_methods: Vec::new(),
            shutdown_on_call: None,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Bundles this fake as the stage workers of a runner.
    pub fn stage_workers(&self) -> StageWorkers {
        StageWorkers {
            metadata: Arc::new(self.clone()),
            indexes: Arc::new(self.clone()),
            donor_data: Arc::new(self.clone()),
            donor_import: Arc::new(self.clone()),
            hla: Arc::new(self.clone()),
            queued_updates: Arc::new(self.clone()),
        }
    }

    pub async fn set_versions(&self, active_version: &str, latest_version: &str) {
        let mut inner = self.inner.lock().await;
        inner.active_version = active_version.to_owned();
        inner.latest_version = latest_version.to_owned();
    }

    /// Makes every call to `method` fail.
    pub async fn fail_on(&self, method: FakeMethod) {
        self.inner.lock().await.failing_methods.insert(method);
    }

    /// Makes only resizes to `tier` fail.
    pub async fn fail_resize_to(&self, tier: &str) {
        self.inner
            .lock()
            .await
            .failing_resize_tiers
            .insert(tier.to_owned());
    }

    /// Clears every configured failure.
    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.failing_methods.clear();
        inner.failing_resize_tiers.clear();
    }

    /// Makes the next call to `method` wait until the returned handle is released.
    pub async fn block_on(&self, method: FakeMethod) -> BlockedCall {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        self.inner
            .lock()
            .await
            .blocked_methods
            .push((method, reached.clone(), release.clone()));

        BlockedCall {
            reached: TimedNotify::new(reached),
            release,
        }
    }

    /// Requests shutdown through `shutdown_tx` as soon as `method` is called.
    pub async fn shutdown_on(&self, method: FakeMethod, shutdown_tx: ShutdownTx) {
        self.inner.lock().await.shutdown_on_call = Some((method, shutdown_tx));
    }

    /// Returns every recorded call in order.
    pub async fn calls(&self) -> Vec<Call> {
        self.inner.lock().await.calls.clone()
    }

    /// Returns the recorded calls except notifications and import trigger toggles.
    pub async fn stage_calls(&self) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| {
                !matches!(
                    call,
                    Call::Notify(_) | Call::EnableImportTrigger | Call::DisableImportTrigger
                )
            })
            .collect()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                Call::Notify(notification) => Some(notification),
                _ => None,
            })
            .collect()
    }

    pub async fn notifications_with_priority(&self, priority: Priority) -> Vec<Notification> {
        self.notifications()
            .await
            .into_iter()
            .filter(|notification| notification.priority == priority)
            .collect()
    }

    pub async fn count_calls(&self, call: &Call) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|recorded| *recorded == call)
            .count()
    }

    /// Records `call` and applies the configured blocking, shutdown and failure behavior.
    async fn record(&self, call: Call) -> RefreshResult<()> {
        let method = call.method();

        let blocked = {
            let mut inner = self.inner.lock().await;

            let should_fail = inner.failing_methods.contains(&method)
                || matches!(&call, Call::Resize { tier, .. } if inner.failing_resize_tiers.contains(tier));
            inner.calls.push(call);

            if let Some((shutdown_method, shutdown_tx)) = &inner.shutdown_on_call {
                if *shutdown_method == method {
                    let _ = shutdown_tx.shutdown();
                }
            }

            let blocked = inner
                .blocked_methods
                .iter()
                .position(|(blocked_method, _, _)| *blocked_method == method)
                .map(|index| inner.blocked_methods.remove(index));

            if should_fail {
                drop(inner);
                if let Some((_, reached, _)) = blocked {
                    reached.notify_one();
                }
                bail!(
                    ErrorKind::StageWorkerFailed,
                    "Injected failure",
                    format!("The fake was configured to fail {method:?}")
                );
            }

            blocked
        };

        if let Some((_, reached, release)) = blocked {
            reached.notify_one();
            release.notified().await;
        }

        Ok(())
    }

    async fn check_lookup(&self, method: FakeMethod) -> RefreshResult<()> {
        if self.inner.lock().await.failing_methods.contains(&method) {
            return Err(refresh_error!(
                ErrorKind::VersionProviderFailed,
                "Injected failure",
                format!("The fake was configured to fail {method:?}")
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl VersionProvider for FakeServices {
    async fn get_active_version(&self) -> RefreshResult<String> {
        self.check_lookup(FakeMethod::GetActiveVersion).await?;
        Ok(self.inner.lock().await.active_version.clone())
    }

    async fn get_latest_version(&self) -> RefreshResult<String> {
        self.check_lookup(FakeMethod::GetLatestVersion).await?;
        Ok(self.inner.lock().await.latest_version.clone())
    }
}

#[async_trait]
impl DormantDatabaseLocator for FakeServices {
    async fn get_dormant_database_name(&self) -> RefreshResult<String> {
        self.check_lookup(FakeMethod::GetDormantDatabaseName)
            .await?;
        Ok(self.inner.lock().await.dormant_database.clone())
    }
}

#[async_trait]
impl DatabaseSizeController for FakeServices {
    async fn resize(&self, database: &str, tier: &str) -> RefreshResult<()> {
        self.record(Call::resize(database, tier)).await
    }
}

#[async_trait]
impl DonorImportTrigger for FakeServices {
    async fn enable(&self) -> RefreshResult<()> {
        self.record(Call::EnableImportTrigger).await
    }

    async fn disable(&self) -> RefreshResult<()> {
        self.record(Call::DisableImportTrigger).await
    }
}

#[async_trait]
impl MetadataWorker for FakeServices {
    async fn rebuild(&self, nomenclature_version: &str) -> RefreshResult<()> {
        self.record(Call::RebuildMetadata {
            nomenclature_version: nomenclature_version.to_owned(),
        })
        .await
    }
}

#[async_trait]
impl IndexWorker for FakeServices {
    async fn remove(&self) -> RefreshResult<()> {
        self.record(Call::RemoveIndexes).await
    }

    async fn create(&self) -> RefreshResult<()> {
        self.record(Call::CreateIndexes).await
    }
}

#[async_trait]
impl DonorDataWorker for FakeServices {
    async fn delete_all(&self) -> RefreshResult<()> {
        self.record(Call::DeleteAllDonors).await
    }
}

#[async_trait]
impl DonorImportWorker for FakeServices {
    async fn import_all(&self) -> RefreshResult<()> {
        self.record(Call::ImportAllDonors).await
    }
}

#[async_trait]
impl HlaWorker for FakeServices {
    async fn process(
        &self,
        nomenclature_version: &str,
        is_continuation: bool,
    ) -> RefreshResult<()> {
        self.record(Call::ProcessHla {
            nomenclature_version: nomenclature_version.to_owned(),
            is_continuation,
        })
        .await
    }
}

#[async_trait]
impl QueuedUpdateWorker for FakeServices {
    async fn replay_during_refresh(&self) -> RefreshResult<()> {
        self.record(Call::ReplayQueuedUpdates).await
    }
}

#[async_trait]
impl NotificationSender for FakeServices {
    async fn send(&self, notification: Notification) -> RefreshResult<()> {
        self.record(Call::Notify(notification)).await
    }
}
