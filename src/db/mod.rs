use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod mutations;
pub mod row_parsers;
pub mod store;
pub mod teams;

pub use store::SqliteStore;

/// Connects to `DATABASE_URL` and applies pending migrations.
pub async fn init() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    connect(&database_url).await
}

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options: SqliteConnectOptions = database_url
        .parse::<SqliteConnectOptions>()
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    Ok(pool)
}
