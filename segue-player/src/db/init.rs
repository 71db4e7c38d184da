//! Database initialization
//!
//! Creates the `sessions` and `settings` tables and seeds default settings
//! values on startup. All steps are idempotent.

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Create required tables if they do not exist
pub async fn init_tables(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize settings table with default values
///
/// Existing values are left alone; only missing keys are seeded.
pub async fn init_settings_defaults(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Initializing default settings");

    let defaults = vec![
        // Delay between a stream finishing and the head pop, giving the
        // transport time to flush
        ("advance_settle_ms", "1000"),
        // Session-level store retry policy
        ("store_retry_attempts", "3"),
        ("store_retry_backoff_ms", "50"),
    ];

    for (key, default_value) in defaults {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
                .bind(key)
                .fetch_one(pool)
                .await?;

        if !exists {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;

            info!(
                "Initialized setting '{}' with default value: {}",
                key, default_value
            );
        }
    }

    Ok(())
}

/// Initialize all required database structures
pub async fn initialize_database(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Initializing database structures");

    init_tables(pool).await?;
    init_settings_defaults(pool).await?;

    info!("Database initialization complete");
    Ok(())
}
