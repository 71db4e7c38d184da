//! Per-session queue document persistence
//!
//! One row per session; the `document` column holds the JSON serialization
//! of [`Queue`]. All mutation is full-document replace. The store reports
//! failures as typed errors; recovery policy (retries, stalling) belongs to
//! the session actor, not here.

use crate::error::Result;
use segue_common::{Queue, SessionId};
use sqlx::{Pool, Sqlite};
use tracing::debug;

/// Queue document store over the `sessions` table
#[derive(Clone)]
pub struct QueueStore {
    pool: Pool<Sqlite>,
}

impl QueueStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Read a session's queue.
    ///
    /// A missing row reads as a fresh empty queue (default volume,
    /// revision 0); the row is only created on first write. A present but
    /// unparseable document is an error, never silently replaced.
    pub async fn get_queue(&self, session_id: &SessionId) -> Result<Queue> {
        let document: Option<String> =
            sqlx::query_scalar("SELECT document FROM sessions WHERE session_id = ?")
                .bind(session_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match document {
            Some(doc) => Ok(Queue::from_document(&doc)?),
            None => Ok(Queue::new()),
        }
    }

    /// Replace a session's queue document.
    ///
    /// No-op fast path: when the stored queue already has the same contents
    /// (items and volume; revision excluded) nothing is written and the
    /// stored value is returned. Otherwise the document is upserted with
    /// `revision = stored.revision + 1` and the post-write value is
    /// re-read and returned, so callers always continue from what the
    /// store actually holds.
    pub async fn update_queue(&self, session_id: &SessionId, queue: &Queue) -> Result<Queue> {
        let stored = self.get_queue(session_id).await?;

        if stored.same_contents(queue) {
            debug!(session = %session_id, revision = stored.revision, "queue unchanged, skipping write");
            return Ok(stored);
        }

        let mut next = queue.clone();
        next.revision = stored.revision + 1;
        let document = next.to_document()?;

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, document)
            VALUES (?, ?)
            ON CONFLICT(session_id) DO UPDATE
                SET document = excluded.document,
                    updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(session_id.as_str())
        .bind(document)
        .execute(&self.pool)
        .await?;

        debug!(session = %session_id, revision = next.revision, len = next.len(), "queue written");

        self.get_queue(session_id).await
    }
}
