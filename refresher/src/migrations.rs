use config::shared::{IntoConnectOptions, PgConnectionConfig};
use postgres::db::REFRESH_SCHEMA;
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;

const NUM_POOL_CONNECTIONS: u32 = 1;

/// Creates or updates the refresh history tables.
pub async fn migrate_history_store(connection: &PgConnectionConfig) -> Result<(), sqlx::Error> {
    let options = connection.with_db().application_name("refresher_migrator");

    let pool = PgPoolOptions::new()
        .max_connections(NUM_POOL_CONNECTIONS)
        .min_connections(NUM_POOL_CONNECTIONS)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("create schema if not exists {REFRESH_SCHEMA};").as_str())
                    .await?;
                // Keeps the `_sqlx_migrations` table inside the refresh schema.
                conn.execute(format!("set search_path = '{REFRESH_SCHEMA}';").as_str())
                    .await?;

                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    pool.close().await;

    Ok(())
}
