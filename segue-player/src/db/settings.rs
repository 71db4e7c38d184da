//! Settings database access
//!
//! Read/write settings from the settings table (key-value store). All
//! settings are service-wide, not per-session.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

/// Store retry policy applied by session actors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per operation (1 = no retry)
    pub attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

/// Per-session engine tuning loaded from the settings table
#[derive(Debug, Clone, Copy)]
pub struct SessionTuning {
    /// Delay between stream finish and the head pop
    pub advance_settle: Duration,
    pub retry: RetryPolicy,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            advance_settle: Duration::from_millis(1000),
            retry: RetryPolicy {
                attempts: 3,
                backoff: Duration::from_millis(50),
            },
        }
    }
}

/// Load session tuning values
///
/// Missing keys fall back to defaults; present values are clamped to sane
/// ranges.
pub async fn load_session_tuning(db: &Pool<Sqlite>) -> Result<SessionTuning> {
    let advance_settle_ms = match get_setting::<u64>(db, "advance_settle_ms").await? {
        Some(ms) => ms.clamp(0, 10_000),
        None => 1000,
    };

    let attempts = match get_setting::<u32>(db, "store_retry_attempts").await? {
        Some(n) => n.clamp(1, 10),
        None => 3,
    };

    let backoff_ms = match get_setting::<u64>(db, "store_retry_backoff_ms").await? {
        Some(ms) => ms.clamp(0, 5_000),
        None => 50,
    };

    Ok(SessionTuning {
        advance_settle: Duration::from_millis(advance_settle_ms),
        retry: RetryPolicy {
            attempts,
            backoff: Duration::from_millis(backoff_ms),
        },
    })
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database. Parses value from string
/// using FromStr.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter (UPSERT)
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            r#"
            CREATE TABLE settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_generic_setting_get_set() {
        let db = setup_test_db().await;

        set_setting(&db, "test_int", 42).await.unwrap();
        let value: Option<i32> = get_setting(&db, "test_int").await.unwrap();
        assert_eq!(value, Some(42));

        set_setting(&db, "test_str", "hello".to_string())
            .await
            .unwrap();
        let value: Option<String> = get_setting(&db, "test_str").await.unwrap();
        assert_eq!(value, Some("hello".to_string()));

        let value: Option<String> = get_setting(&db, "nonexistent").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_setting_update_upserts() {
        let db = setup_test_db().await;

        set_setting(&db, "test_key", "value1".to_string())
            .await
            .unwrap();
        set_setting(&db, "test_key", "value2".to_string())
            .await
            .unwrap();

        let value: Option<String> = get_setting(&db, "test_key").await.unwrap();
        assert_eq!(value, Some("value2".to_string()));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let db = setup_test_db().await;

        set_setting(&db, "advance_settle_ms", "not-a-number".to_string())
            .await
            .unwrap();
        let result = get_setting::<u64>(&db, "advance_settle_ms").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_tuning_defaults_when_unset() {
        let db = setup_test_db().await;

        let tuning = load_session_tuning(&db).await.unwrap();
        assert_eq!(tuning.advance_settle, Duration::from_millis(1000));
        assert_eq!(tuning.retry.attempts, 3);
        assert_eq!(tuning.retry.backoff, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_tuning_clamps_out_of_range_values() {
        let db = setup_test_db().await;

        set_setting(&db, "advance_settle_ms", 60_000u64).await.unwrap();
        set_setting(&db, "store_retry_attempts", 0u32).await.unwrap();
        set_setting(&db, "store_retry_backoff_ms", 9_999u64)
            .await
            .unwrap();

        let tuning = load_session_tuning(&db).await.unwrap();
        assert_eq!(tuning.advance_settle, Duration::from_millis(10_000));
        assert_eq!(tuning.retry.attempts, 1);
        assert_eq!(tuning.retry.backoff, Duration::from_millis(5_000));
    }
}
