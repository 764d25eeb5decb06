use async_trait::async_trait;
use chrono::Utc;
use postgres::history;
use sqlx::PgPool;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, RefreshResult};
use crate::record::{RecordId, RefreshRecord};
use crate::stage::RefreshStage;
use crate::store::base::HistoryStore;

/// History store backed by the `refresh.data_refresh_history` table.
///
/// Every call goes straight to the database. Nothing is cached, since a resumed run must see
/// exactly what the previous run durably wrote.
#[derive(Debug, Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fails with [`ErrorKind::RecordNotFound`] when an update touched no row because the record
    /// does not exist.
    async fn ensure_exists(&self, id: RecordId, updated: bool) -> RefreshResult<()> {
        if updated || history::get_row(&self.pool, id).await?.is_some() {
            return Ok(());
        }

        bail!(
            ErrorKind::RecordNotFound,
            "History record not found",
            format!("No refresh record with id {id} exists")
        );
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn get_current_record(&self) -> RefreshResult<Option<RefreshRecord>> {
        history::get_current_row(&self.pool)
            .await?
            .map(RefreshRecord::try_from)
            .transpose()
    }

    async fn get_record(&self, id: RecordId) -> RefreshResult<Option<RefreshRecord>> {
        history::get_row(&self.pool, id)
            .await?
            .map(RefreshRecord::try_from)
            .transpose()
    }

    async fn create(&self, record: RefreshRecord) -> RefreshResult<RecordId> {
        let row = history::DataRefreshHistoryRow::from(&record);
        history::insert_row(&self.pool, &row).await?;

        debug!(record_id = %record.id, target_database = %record.target_database, "refresh record created");

        Ok(record.id)
    }

    async fn mark_stage_complete(&self, id: RecordId, stage: RefreshStage) -> RefreshResult<()> {
        let updated =
            history::append_completed_stage(&self.pool, id, stage.as_static_str(), Utc::now())
                .await?;

        self.ensure_exists(id, updated).await
    }

    async fn mark_finished(&self, id: RecordId, succeeded: bool) -> RefreshResult<()> {
        let updated = history::mark_finished(&self.pool, id, succeeded, Utc::now()).await?;
        self.ensure_exists(id, updated).await?;

        if !updated {
            debug!(record_id = %id, "refresh record was already finished");
        }

        Ok(())
    }

    async fn get_in_progress_records(&self) -> RefreshResult<Vec<RefreshRecord>> {
        history::get_in_progress_rows(&self.pool)
            .await?
            .into_iter()
            .map(RefreshRecord::try_from)
            .collect()
    }

    async fn mark_continued(&self, id: RecordId) -> RefreshResult<()> {
        let updated = history::mark_continued(&self.pool, id, Utc::now()).await?;

        self.ensure_exists(id, updated).await
    }

    async fn record_heartbeat(&self, id: RecordId) -> RefreshResult<()> {
        let updated = history::record_heartbeat(&self.pool, id, Utc::now()).await?;

        self.ensure_exists(id, updated).await
    }
}
