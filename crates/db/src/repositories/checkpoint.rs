use chrono::Utc;
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use super::user_config::{parse_timestamp, parse_uuid};
use super::{CheckpointRecord, CheckpointRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCheckpointRepository {
    pool: DbPool,
}

impl SqlCheckpointRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<CheckpointRecord, RepositoryError> {
    let thread_id: String =
        row.try_get("thread_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state: String = row.try_get("state").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let suspended: Option<String> =
        row.try_get("suspended").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let state: Value =
        serde_json::from_str(&state).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let suspended = suspended
        .map(|raw| serde_json::from_str::<Value>(&raw))
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(CheckpointRecord {
        thread_id: parse_uuid(&thread_id)?,
        state,
        suspended,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl CheckpointRepository for SqlCheckpointRepository {
    async fn load(&self, thread_id: &Uuid) -> Result<Option<CheckpointRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT thread_id, state, suspended, created_at, updated_at
             FROM checkpoints WHERE thread_id = ?",
        )
        .bind(thread_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: CheckpointRecord) -> Result<(), RepositoryError> {
        let suspended = record.suspended.as_ref().map(Value::to_string);

        sqlx::query(
            "INSERT INTO checkpoints (thread_id, state, suspended, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(thread_id) DO UPDATE SET
                 state = excluded.state,
                 suspended = excluded.suspended,
                 updated_at = excluded.updated_at",
        )
        .bind(record.thread_id.to_string())
        .bind(record.state.to_string())
        .bind(&suspended)
        .bind(record.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, thread_id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
