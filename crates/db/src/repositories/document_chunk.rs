use serde_json::{Map, Value};
use sqlx::Row;

use super::user_config::{parse_json_map, parse_timestamp, parse_uuid};
use super::{metadata_matches, DocumentChunk, DocumentChunkRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDocumentChunkRepository {
    pool: DbPool,
}

impl SqlDocumentChunkRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentChunk, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source: String =
        row.try_get("source").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata: String =
        row.try_get("metadata").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(DocumentChunk {
        id: parse_uuid(&id)?,
        source,
        content,
        metadata: parse_json_map(&metadata)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl DocumentChunkRepository for SqlDocumentChunkRepository {
    async fn save(&self, chunk: DocumentChunk) -> Result<(), RepositoryError> {
        let metadata_json = Value::Object(chunk.metadata.clone()).to_string();

        sqlx::query(
            "INSERT INTO document_chunks (id, source, content, metadata, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 source = excluded.source,
                 content = excluded.content,
                 metadata = excluded.metadata",
        )
        .bind(chunk.id.to_string())
        .bind(&chunk.source)
        .bind(&chunk.content)
        .bind(metadata_json)
        .bind(chunk.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_matching(
        &self,
        filters: &Map<String, Value>,
    ) -> Result<Vec<DocumentChunk>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, source, content, metadata, created_at
             FROM document_chunks ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let chunks = rows.iter().map(row_to_chunk).collect::<Result<Vec<_>, _>>()?;
        Ok(chunks.into_iter().filter(|chunk| metadata_matches(&chunk.metadata, filters)).collect())
    }
}
