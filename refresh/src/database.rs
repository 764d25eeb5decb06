//! Access to the pair of donor databases and their sizing.

use async_trait::async_trait;

use crate::error::RefreshResult;

/// Resizes a named database to a service tier.
///
/// Resizing to the tier a database already has must succeed without side effects, since
/// compensation and cleanup may repeat a resize that already happened.
#[async_trait]
pub trait DatabaseSizeController: Send + Sync {
    async fn resize(&self, database: &str, tier: &str) -> RefreshResult<()>;
}

/// Tells which database of the pair is currently not serving traffic.
#[async_trait]
pub trait DormantDatabaseLocator: Send + Sync {
    async fn get_dormant_database_name(&self) -> RefreshResult<String>;
}

/// Controls the trigger that imports differential donor updates into the live system.
///
/// The trigger is disabled while a refresh runs so that differential imports queue up instead of
/// racing with the bulk import. Queued updates are replayed by the last stage of the refresh.
#[async_trait]
pub trait DonorImportTrigger: Send + Sync {
    async fn enable(&self) -> RefreshResult<()>;

    async fn disable(&self) -> RefreshResult<()>;
}
