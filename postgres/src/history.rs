use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// A row from the `refresh.data_refresh_history` table.
///
/// Stages are stored by their stable snake_case names in insertion order.
#[derive(Debug, Clone, FromRow)]
pub struct DataRefreshHistoryRow {
    pub id: Uuid,
    pub target_database: String,
    pub nomenclature_version: String,
    pub requested_at: DateTime<Utc>,
    pub last_continued_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed_stages: Vec<String>,
    pub succeeded: Option<bool>,
}

/// Returns the most recently requested record, finished or not.
pub async fn get_current_row(pool: &PgPool) -> sqlx::Result<Option<DataRefreshHistoryRow>> {
    sqlx::query_as::<_, DataRefreshHistoryRow>(
        r#"
        select id, target_database, nomenclature_version, requested_at, last_continued_at,
            last_heartbeat_at, finished_at, completed_stages, succeeded
        from refresh.data_refresh_history
        order by requested_at desc
        limit 1
        "#,
    )
    .fetch_optional(pool)
    .await
}

pub async fn get_row(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<DataRefreshHistoryRow>> {
    sqlx::query_as::<_, DataRefreshHistoryRow>(
        r#"
        select id, target_database, nomenclature_version, requested_at, last_continued_at,
            last_heartbeat_at, finished_at, completed_stages, succeeded
        from refresh.data_refresh_history
        where id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Returns every record that has not been marked finished, oldest first.
pub async fn get_in_progress_rows(pool: &PgPool) -> sqlx::Result<Vec<DataRefreshHistoryRow>> {
    sqlx::query_as::<_, DataRefreshHistoryRow>(
        r#"
        select id, target_database, nomenclature_version, requested_at, last_continued_at,
            last_heartbeat_at, finished_at, completed_stages, succeeded
        from refresh.data_refresh_history
        where finished_at is null
        order by requested_at asc
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Inserts a new record.
///
/// Fails with a unique violation when another unfinished record exists, since the table carries
/// a partial unique index over unfinished rows.
pub async fn insert_row(pool: &PgPool, row: &DataRefreshHistoryRow) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into refresh.data_refresh_history (
            id, target_database, nomenclature_version, requested_at, last_continued_at,
            last_heartbeat_at, finished_at, completed_stages, succeeded
        )
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(row.id)
    .bind(&row.target_database)
    .bind(&row.nomenclature_version)
    .bind(row.requested_at)
    .bind(row.last_continued_at)
    .bind(row.last_heartbeat_at)
    .bind(row.finished_at)
    .bind(&row.completed_stages)
    .bind(row.succeeded)
    .execute(pool)
    .await?;

    Ok(())
}

/// Appends a stage to the completed stages of a record unless it is already present.
///
/// Also refreshes the heartbeat. Returns `false` when no record with `id` exists.
pub async fn append_completed_stage(
    pool: &PgPool,
    id: Uuid,
    stage: &str,
    at: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        update refresh.data_refresh_history
        set completed_stages = case
                when $2 = any(completed_stages) then completed_stages
                else array_append(completed_stages, $2)
            end,
            last_heartbeat_at = $3
        where id = $1
        "#,
    )
    .bind(id)
    .bind(stage)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Marks a record as finished, leaving already finished records untouched.
///
/// Returns `false` when the record does not exist or was already finished.
pub async fn mark_finished(
    pool: &PgPool,
    id: Uuid,
    succeeded: bool,
    at: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        update refresh.data_refresh_history
        set finished_at = $3, succeeded = $2
        where id = $1 and finished_at is null
        "#,
    )
    .bind(id)
    .bind(succeeded)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Stamps the continuation and heartbeat timestamps of a record.
///
/// Returns `false` when no record with `id` exists.
pub async fn mark_continued(pool: &PgPool, id: Uuid, at: DateTime<Utc>) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        update refresh.data_refresh_history
        set last_continued_at = $2, last_heartbeat_at = $2
        where id = $1
        "#,
    )
    .bind(id)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Stamps the heartbeat of an unfinished record.
///
/// Returns `false` when the record does not exist or is already finished.
pub async fn record_heartbeat(pool: &PgPool, id: Uuid, at: DateTime<Utc>) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        update refresh.data_refresh_history
        set last_heartbeat_at = $2
        where id = $1 and finished_at is null
        "#,
    )
    .bind(id)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
