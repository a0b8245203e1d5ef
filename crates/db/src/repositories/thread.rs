use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use concierge_core::Thread;

use super::user_config::{parse_json_map, parse_timestamp, parse_uuid};
use super::{RepositoryError, ThreadRepository};
use crate::DbPool;

pub struct SqlThreadRepository {
    pool: DbPool,
}

impl SqlThreadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_thread(row: &sqlx::sqlite::SqliteRow) -> Result<Thread, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_config_id: String =
        row.try_get("user_config_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_data: String =
        row.try_get("user_data").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Thread {
        id: parse_uuid(&id)?,
        user_config_id: parse_uuid(&user_config_id)?,
        user_data: parse_json_map(&user_data)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl ThreadRepository for SqlThreadRepository {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Thread>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_config_id, user_data, created_at, updated_at
             FROM threads WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_thread(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, thread: Thread) -> Result<(), RepositoryError> {
        let user_data_json = Value::Object(thread.user_data.clone()).to_string();

        sqlx::query(
            "INSERT INTO threads (id, user_config_id, user_data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 user_data = excluded.user_data,
                 updated_at = excluded.updated_at",
        )
        .bind(thread.id.to_string())
        .bind(thread.user_config_id.to_string())
        .bind(user_data_json)
        .bind(thread.created_at.to_rfc3339())
        .bind(thread.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_user_config(
        &self,
        user_config_id: &Uuid,
    ) -> Result<Vec<Thread>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, user_config_id, user_data, created_at, updated_at
             FROM threads WHERE user_config_id = ? ORDER BY created_at ASC",
        )
        .bind(user_config_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_thread).collect::<Result<Vec<_>, _>>()
    }
}
