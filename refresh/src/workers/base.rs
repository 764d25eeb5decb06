//! Workers performing the expensive work of the data stages.
//!
//! Workers act on the dormant database. They are invoked sequentially by the runner and are only
//! reached through these traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RefreshResult;

/// Rebuilds the HLA metadata dictionary for a nomenclature version.
#[async_trait]
pub trait MetadataWorker: Send + Sync {
    async fn rebuild(&self, nomenclature_version: &str) -> RefreshResult<()>;
}

/// Drops and recreates the search indexes of the dormant database.
#[async_trait]
pub trait IndexWorker: Send + Sync {
    async fn remove(&self) -> RefreshResult<()>;

    async fn create(&self) -> RefreshResult<()>;
}

#[async_trait]
pub trait DonorDataWorker: Send + Sync {
    /// Deletes every donor from the dormant database.
    async fn delete_all(&self) -> RefreshResult<()>;
}

#[async_trait]
pub trait DonorImportWorker: Send + Sync {
    /// Imports the full donor set into the dormant database.
    async fn import_all(&self) -> RefreshResult<()>;
}

/// Expands donor HLA typings against a nomenclature version.
#[async_trait]
pub trait HlaWorker: Send + Sync {
    /// When `is_continuation` is `true` donors that were already processed by an interrupted run
    /// are kept instead of being processed from scratch.
    async fn process(&self, nomenclature_version: &str, is_continuation: bool)
    -> RefreshResult<()>;
}

#[async_trait]
pub trait QueuedUpdateWorker: Send + Sync {
    /// Applies donor updates that were queued while the refresh was running.
    async fn replay_during_refresh(&self) -> RefreshResult<()>;
}

/// The workers a runner dispatches data stages to.
#[derive(Clone)]
pub struct StageWorkers {
    pub metadata: Arc<dyn MetadataWorker>,
    pub indexes: Arc<dyn IndexWorker>,
    pub donor_data: Arc<dyn DonorDataWorker>,
    pub donor_import: Arc<dyn DonorImportWorker>,
    pub hla: Arc<dyn HlaWorker>,
    pub queued_updates: Arc<dyn QueuedUpdateWorker>,
}
