use async_trait::async_trait;

use crate::error::RefreshResult;

/// Source of HLA nomenclature versions.
#[async_trait]
pub trait VersionProvider: Send + Sync {
    /// Returns the version the active database was built against.
    async fn get_active_version(&self) -> RefreshResult<String>;

    /// Returns the newest published version.
    async fn get_latest_version(&self) -> RefreshResult<String>;
}
