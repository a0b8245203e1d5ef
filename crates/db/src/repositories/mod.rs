use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use concierge_core::{Thread, UserConfig};

pub mod checkpoint;
pub mod document_chunk;
pub mod memory;
pub mod thread;
pub mod user_config;

pub use checkpoint::SqlCheckpointRepository;
pub use document_chunk::SqlDocumentChunkRepository;
pub use memory::{
    InMemoryCheckpointRepository, InMemoryDocumentChunkRepository, InMemoryThreadRepository,
    InMemoryUserConfigRepository,
};
pub use thread::SqlThreadRepository;
pub use user_config::SqlUserConfigRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Raw persisted checkpoint row. The agent layer owns the typed shape of
/// `state` and `suspended`; this layer stores and returns them as JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointRecord {
    pub thread_id: Uuid,
    pub state: Value,
    pub suspended: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(thread_id: Uuid, state: Value, suspended: Option<Value>) -> Self {
        let now = Utc::now();
        Self { thread_id, state, suspended, created_at: now, updated_at: now }
    }
}

/// One indexed retrieval chunk. `metadata` carries equality-filterable
/// attributes such as the owning `user_config_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub source: String,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    pub fn new(source: impl Into<String>, content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            content: content.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait UserConfigRepository: Send + Sync {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<UserConfig>, RepositoryError>;
    async fn save(&self, user_config: UserConfig) -> Result<(), RepositoryError>;
    async fn list_active(&self) -> Result<Vec<UserConfig>, RepositoryError>;
}

#[async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Thread>, RepositoryError>;
    async fn save(&self, thread: Thread) -> Result<(), RepositoryError>;
    async fn list_for_user_config(
        &self,
        user_config_id: &Uuid,
    ) -> Result<Vec<Thread>, RepositoryError>;
}

#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn load(&self, thread_id: &Uuid) -> Result<Option<CheckpointRecord>, RepositoryError>;
    async fn save(&self, record: CheckpointRecord) -> Result<(), RepositoryError>;
    async fn delete(&self, thread_id: &Uuid) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DocumentChunkRepository: Send + Sync {
    async fn save(&self, chunk: DocumentChunk) -> Result<(), RepositoryError>;

    /// Chunks whose metadata matches every filter key by scalar equality.
    /// An empty filter map matches everything.
    async fn list_matching(
        &self,
        filters: &Map<String, Value>,
    ) -> Result<Vec<DocumentChunk>, RepositoryError>;
}

pub(crate) fn metadata_matches(metadata: &Map<String, Value>, filters: &Map<String, Value>) -> bool {
    filters.iter().all(|(key, expected)| metadata.get(key) == Some(expected))
}
