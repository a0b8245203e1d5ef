use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::Row;
use uuid::Uuid;

use concierge_core::UserConfig;

use super::{RepositoryError, UserConfigRepository};
use crate::DbPool;

pub struct SqlUserConfigRepository {
    pool: DbPool,
}

impl SqlUserConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn parse_json_map(raw: &str) -> Result<Map<String, Value>, RepositoryError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RepositoryError::Decode(format!("expected JSON object, got {other}"))),
        Err(e) => Err(RepositoryError::Decode(e.to_string())),
    }
}

fn row_to_user_config(row: &sqlx::sqlite::SqliteRow) -> Result<UserConfig, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: Option<String> =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let config: String =
        row.try_get("config").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: i64 = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(UserConfig {
        id: parse_uuid(&id)?,
        description,
        config: parse_json_map(&config)?,
        active: active != 0,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl UserConfigRepository for SqlUserConfigRepository {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<UserConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, description, config, active, created_at, updated_at
             FROM user_configs WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user_config(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user_config: UserConfig) -> Result<(), RepositoryError> {
        let config_json = Value::Object(user_config.config.clone()).to_string();

        sqlx::query(
            "INSERT INTO user_configs (id, description, config, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 description = excluded.description,
                 config = excluded.config,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(user_config.id.to_string())
        .bind(&user_config.description)
        .bind(config_json)
        .bind(user_config.active as i64)
        .bind(user_config.created_at.to_rfc3339())
        .bind(user_config.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<UserConfig>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, description, config, active, created_at, updated_at
             FROM user_configs WHERE active = 1 ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user_config).collect::<Result<Vec<_>, _>>()
    }
}
