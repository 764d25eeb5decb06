use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, RefreshResult};
use crate::record::{RecordId, RefreshRecord};
use crate::stage::RefreshStage;
use crate::store::base::HistoryStore;

#[derive(Debug, Default)]
struct Inner {
    /// Records in creation order.
    records: Vec<RefreshRecord>,
}

impl Inner {
    fn record_mut(&mut self, id: RecordId) -> RefreshResult<&mut RefreshRecord> {
        match self.records.iter_mut().find(|record| record.id == id) {
            Some(record) => Ok(record),
            None => bail!(
                ErrorKind::RecordNotFound,
                "History record not found",
                format!("No refresh record with id {id} exists")
            ),
        }
    }
}

/// In-memory history store.
///
/// Enforces the same single in-progress record rule as the Postgres store. Everything is lost on
/// process restart, so it is meant for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every record in creation order.
    pub async fn records(&self) -> Vec<RefreshRecord> {
        self.inner.lock().await.records.clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get_current_record(&self) -> RefreshResult<Option<RefreshRecord>> {
        let inner = self.inner.lock().await;

        // `max_by_key` keeps the last maximum, so the most recently created record wins ties.
        let current = inner
            .records
            .iter()
            .max_by_key(|record| record.requested_at)
            .cloned();

        Ok(current)
    }

    async fn get_record(&self, id: RecordId) -> RefreshResult<Option<RefreshRecord>> {
        let inner = self.inner.lock().await;

        Ok(inner.records.iter().find(|record| record.id == id).cloned())
    }

    async fn create(&self, record: RefreshRecord) -> RefreshResult<RecordId> {
        let mut inner = self.inner.lock().await;

        if inner.records.iter().any(|existing| existing.id == record.id) {
            bail!(
                ErrorKind::InvalidState,
                "History record already exists",
                format!("A refresh record with id {} already exists", record.id)
            );
        }

        let in_progress = inner.records.iter().find(|existing| existing.is_in_progress());
        if let (true, Some(in_progress)) = (record.is_in_progress(), in_progress) {
            bail!(
                ErrorKind::InvalidState,
                "Another data refresh is already in progress",
                format!(
                    "Refresh record {} targeting '{}' is still in progress",
                    in_progress.id, in_progress.target_database
                )
            );
        }

        let id = record.id;
        inner.records.push(record);

        Ok(id)
    }

    async fn mark_stage_complete(&self, id: RecordId, stage: RefreshStage) -> RefreshResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.record_mut(id)?;

        record.completed_stages.insert(stage);
        record.last_heartbeat_at = Some(Utc::now());

        Ok(())
    }

    async fn mark_finished(&self, id: RecordId, succeeded: bool) -> RefreshResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.record_mut(id)?;

        if record.is_in_progress() {
            record.finished_at = Some(Utc::now());
            record.succeeded = Some(succeeded);
        }

        Ok(())
    }

    async fn get_in_progress_records(&self) -> RefreshResult<Vec<RefreshRecord>> {
        let inner = self.inner.lock().await;

        let mut records = inner
            .records
            .iter()
            .filter(|record| record.is_in_progress())
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by_key(|record| record.requested_at);

        Ok(records)
    }

    async fn mark_continued(&self, id: RecordId) -> RefreshResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.record_mut(id)?;

        let now = Utc::now();
        record.last_continued_at = Some(now);
        record.last_heartbeat_at = Some(now);

        Ok(())
    }

    async fn record_heartbeat(&self, id: RecordId) -> RefreshResult<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.record_mut(id)?;

        if record.is_in_progress() {
            record.last_heartbeat_at = Some(Utc::now());
        }

        Ok(())
    }
}
