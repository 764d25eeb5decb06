use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

/// Schema holding all data refresh tables.
pub const REFRESH_SCHEMA: &str = "refresh";

/// Connects to the database holding the refresh history with a small connection pool.
///
/// The history store issues one statement per stage boundary, so a couple of connections is
/// plenty.
pub async fn connect_to_history_database(
    config: &PgConnectionConfig,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let options: PgConnectOptions = config.with_db();

    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .connect_with(options)
        .await
}
