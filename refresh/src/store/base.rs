use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RefreshResult;
use crate::record::{RecordId, RefreshRecord};
use crate::stage::RefreshStage;

/// Durable log of refresh attempts.
///
/// The history store is the only state a run consults to decide where to resume, so every write
/// must be durable before the call returns.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Returns the most recently requested record, finished or not.
    async fn get_current_record(&self) -> RefreshResult<Option<RefreshRecord>>;

    async fn get_record(&self, id: RecordId) -> RefreshResult<Option<RefreshRecord>>;

    /// Persists a new record and returns its id.
    ///
    /// Fails with [`crate::error::ErrorKind::InvalidState`] if another record is still in
    /// progress.
    async fn create(&self, record: RefreshRecord) -> RefreshResult<RecordId>;

    /// Adds `stage` to the completed stages of the record and refreshes its heartbeat.
    ///
    /// Completing an already completed stage is a no-op.
    async fn mark_stage_complete(&self, id: RecordId, stage: RefreshStage) -> RefreshResult<()>;

    /// Finishes the record with the given outcome.
    ///
    /// The outcome of an already finished record is never overwritten.
    async fn mark_finished(&self, id: RecordId, succeeded: bool) -> RefreshResult<()>;

    /// Returns every unfinished record, oldest first.
    async fn get_in_progress_records(&self) -> RefreshResult<Vec<RefreshRecord>>;

    /// Stamps the record as continued by a new run.
    async fn mark_continued(&self, id: RecordId) -> RefreshResult<()>;

    /// Stamps the record as still being worked on.
    async fn record_heartbeat(&self, id: RecordId) -> RefreshResult<()>;
}

pub type BoxedHistoryStore = Arc<dyn HistoryStore>;
