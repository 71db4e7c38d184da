//! Database access layer
//!
//! SQLite persistence for session queue documents and runtime settings.

pub mod init;
pub mod queue_store;
pub mod settings;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Open (creating if missing) the service database.
pub async fn connect(database_path: &Path) -> Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Some(Duration::from_secs(60)))
        .connect_with(options)
        .await?;

    info!("Connected to database: {:?}", database_path);
    Ok(pool)
}
