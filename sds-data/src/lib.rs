//! Data layer: entities, repositories and the per-request database session.
//!
//! Repositories never begin, commit or roll back transactions; they run on
//! the [`Session`](session::Session) the middleware opened for the request.

pub mod entity;
pub mod page;
pub mod repository;
pub mod session;

use sds_core::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connect to the database and apply pending migrations.
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Config(format!("Invalid DATABASE_URL: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| AppError::Config(format!("Database connection failed: {e}")))?;
    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| AppError::Config(format!("Database migration failed: {e}")))?;
    Ok(pool)
}

/// Probe used by the health aggregator.
pub async fn is_healthy(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}
