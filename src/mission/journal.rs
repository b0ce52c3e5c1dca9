//! Durable activity journal.
//!
//! The workflow body is deterministic; everything non-deterministic (LLM
//! calls, tool runs, event emission, notifications) executes as an activity
//! with a stable `(mission_id, seq)` identity. Results are recorded here,
//! so a restarted workflow re-runs its body and replays recorded results
//! instead of repeating side effects.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// SQLite-backed journal of activity results.
#[derive(Debug, Clone)]
pub struct ActivityJournal {
    pool: SqlitePool,
}

impl ActivityJournal {
    /// Create the journal, ensuring its table exists.
    ///
    /// # Errors
    ///
    /// Returns a database error if the table cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS activity_journal (
                mission_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                name TEXT NOT NULL,
                result TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (mission_id, seq)
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Look up a recorded result for `(mission_id, seq)`.
    ///
    /// # Errors
    ///
    /// Returns a database error on query failure; a malformed stored value
    /// is treated as absent (the activity re-runs).
    pub async fn lookup(
        &self,
        mission_id: &str,
        seq: i64,
    ) -> Result<Option<serde_json::Value>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT result FROM activity_journal WHERE mission_id = ? AND seq = ?",
        )
        .bind(mission_id)
        .bind(seq)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| {
            let text: String = r.get("result");
            serde_json::from_str(&text).ok()
        }))
    }

    /// Record an activity result. Idempotent per `(mission_id, seq)`.
    ///
    /// # Errors
    ///
    /// Returns a database error on write failure.
    pub async fn record(
        &self,
        mission_id: &str,
        seq: i64,
        name: &str,
        result: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO activity_journal
                 (mission_id, seq, name, result, recorded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(mission_id)
        .bind(seq)
        .bind(name)
        .bind(result.to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop all entries for a mission (after terminal persistence).
    ///
    /// # Errors
    ///
    /// Returns a database error on delete failure.
    pub async fn clear(&self, mission_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM activity_journal WHERE mission_id = ?")
            .bind(mission_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
