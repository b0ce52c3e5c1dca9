//! Mission row persistence (SQLite via sqlx).
//!
//! Rows are created by the control API, status-updated only by the
//! workflow, and become read-only once terminal. `DELETE` removes the row
//! without touching a running workflow.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::types::{MissionStatus, ScanInput, ScanOutput};

/// One persisted mission row.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MissionRecord {
    /// Mission identifier.
    pub id: String,
    /// Workflow instance identifier.
    pub workflow_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Requesting user.
    pub user_id: String,
    /// Primary target (first of the declared set).
    pub target: String,
    /// Scan type label.
    pub scan_type: String,
    /// Full mission input as JSON.
    pub config: ScanInput,
    /// Auto-pilot flag.
    pub auto_pilot: bool,
    /// Current status.
    pub status: MissionStatus,
    /// Terminal output, once finished.
    pub result: Option<ScanOutput>,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Start timestamp.
    pub started_at: Option<String>,
    /// Completion timestamp.
    pub completed_at: Option<String>,
}

/// Errors from the mission store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("mission store error: {0}")]
    Database(#[from] sqlx::Error),

    /// Attempted to mutate a terminal mission row.
    #[error("mission {id} is terminal and immutable")]
    Terminal {
        /// The immutable mission.
        id: String,
    },

    /// Stored JSON could not be decoded.
    #[error("corrupt mission row {id}: {detail}")]
    Corrupt {
        /// The offending mission.
        id: String,
        /// What failed to decode.
        detail: String,
    },
}

/// SQLite-backed mission store.
#[derive(Debug, Clone)]
pub struct MissionStore {
    pool: SqlitePool,
}

impl MissionStore {
    /// Create the store, ensuring its table exists.
    ///
    /// # Errors
    ///
    /// Returns a database error if the table cannot be created.
    pub async fn new(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS missions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                target TEXT NOT NULL,
                scan_type TEXT NOT NULL,
                config TEXT NOT NULL,
                auto_pilot INTEGER NOT NULL,
                status TEXT NOT NULL,
                result TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Insert a new pending mission row.
    ///
    /// # Errors
    ///
    /// Returns a database error on insert failure.
    pub async fn create(&self, input: &ScanInput, scan_type: &str) -> Result<(), StoreError> {
        let config = serde_json::to_string(input).map_err(|e| StoreError::Corrupt {
            id: input.mission_id.clone(),
            detail: e.to_string(),
        })?;

        sqlx::query(
            "INSERT INTO missions
                 (id, workflow_id, tenant_id, user_id, target, scan_type,
                  config, auto_pilot, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&input.mission_id)
        .bind(format!("scan-{}", input.mission_id))
        .bind(&input.tenant_id)
        .bind(&input.user_id)
        .bind(input.targets.first().cloned().unwrap_or_default())
        .bind(scan_type)
        .bind(config)
        .bind(i32::from(input.auto_pilot))
        .bind(MissionStatus::Pending.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch one mission row.
    ///
    /// # Errors
    ///
    /// Returns a database error on query failure or a corrupt row.
    pub async fn get(&self, id: &str) -> Result<Option<MissionRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM missions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(decode_row).transpose()
    }

    /// List mission rows for a tenant, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database error on query failure.
    pub async fn list(&self, tenant_id: &str) -> Result<Vec<MissionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM missions WHERE tenant_id = ? ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(decode_row).collect()
    }

    /// List non-terminal missions (for restart recovery).
    ///
    /// # Errors
    ///
    /// Returns a database error on query failure.
    pub async fn non_terminal(&self) -> Result<Vec<MissionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM missions WHERE status IN ('pending', 'running', 'paused')",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(decode_row).collect()
    }

    /// Update a mission's status. Refused once the row is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Terminal`] for terminal rows or a database
    /// error on update failure.
    pub async fn update_status(&self, id: &str, status: MissionStatus) -> Result<(), StoreError> {
        if let Some(record) = self.get(id).await? {
            if record.status.is_terminal() {
                return Err(StoreError::Terminal { id: id.to_owned() });
            }
        }

        let started_at = (status == MissionStatus::Running).then(|| Utc::now().to_rfc3339());
        sqlx::query(
            "UPDATE missions SET status = ?,
                 started_at = COALESCE(?, started_at)
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(started_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist the terminal output for a mission.
    ///
    /// # Errors
    ///
    /// Returns a database error on update failure.
    pub async fn record_result(&self, output: &ScanOutput) -> Result<(), StoreError> {
        let result = serde_json::to_string(output).map_err(|e| StoreError::Corrupt {
            id: output.mission_id.clone(),
            detail: e.to_string(),
        })?;

        sqlx::query(
            "UPDATE missions SET status = ?, result = ?, completed_at = ? WHERE id = ?",
        )
        .bind(output.status.as_str())
        .bind(result)
        .bind(Utc::now().to_rfc3339())
        .bind(&output.mission_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a mission row. Does not affect a running workflow.
    ///
    /// # Errors
    ///
    /// Returns a database error on delete failure.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM missions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Decode a database row into a [`MissionRecord`].
fn decode_row(row: sqlx::sqlite::SqliteRow) -> Result<MissionRecord, StoreError> {
    let id: String = row.get("id");

    let config_text: String = row.get("config");
    let config: ScanInput =
        serde_json::from_str(&config_text).map_err(|e| StoreError::Corrupt {
            id: id.clone(),
            detail: format!("config: {e}"),
        })?;

    let status_text: String = row.get("status");
    let status: MissionStatus = status_text.parse().map_err(|e| StoreError::Corrupt {
        id: id.clone(),
        detail: e,
    })?;

    let result_text: Option<String> = row.get("result");
    let result = match result_text {
        Some(text) => Some(serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            id: id.clone(),
            detail: format!("result: {e}"),
        })?),
        None => None,
    };

    let auto_pilot: i32 = row.get("auto_pilot");

    Ok(MissionRecord {
        workflow_id: row.get("workflow_id"),
        tenant_id: row.get("tenant_id"),
        user_id: row.get("user_id"),
        target: row.get("target"),
        scan_type: row.get("scan_type"),
        config,
        auto_pilot: auto_pilot != 0,
        status,
        result,
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        id,
    })
}
