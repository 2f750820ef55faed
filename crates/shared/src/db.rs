//! Postgres pool and schema migrations for the session store

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::{str::FromStr, time::Duration};

/// Pool sizing for the coordinator. Connections are recycled so a
/// restarted database or pooler is picked up without a process restart.
pub fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(60))
        .max_lifetime(Duration::from_secs(300))
}

/// Connect to `database_url`. The statement cache is disabled so the pool
/// also works behind PgBouncer in transaction mode.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?.statement_cache_capacity(0);
    pool_options(max_connections).connect_with(options).await
}

/// Apply the `chat_sessions`/`chat_messages` schema
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
