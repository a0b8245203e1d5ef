use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use concierge_core::{Thread, UserConfig};

use super::{
    metadata_matches, CheckpointRecord, CheckpointRepository, DocumentChunk,
    DocumentChunkRepository, RepositoryError, ThreadRepository, UserConfigRepository,
};

#[derive(Default)]
pub struct InMemoryUserConfigRepository {
    user_configs: RwLock<HashMap<Uuid, UserConfig>>,
}

#[async_trait::async_trait]
impl UserConfigRepository for InMemoryUserConfigRepository {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<UserConfig>, RepositoryError> {
        let user_configs = self.user_configs.read().await;
        Ok(user_configs.get(id).cloned())
    }

    async fn save(&self, user_config: UserConfig) -> Result<(), RepositoryError> {
        let mut user_configs = self.user_configs.write().await;
        user_configs.insert(user_config.id, user_config);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<UserConfig>, RepositoryError> {
        let user_configs = self.user_configs.read().await;
        let mut active: Vec<UserConfig> =
            user_configs.values().filter(|config| config.active).cloned().collect();
        active.sort_by_key(|config| config.created_at);
        Ok(active)
    }
}

#[derive(Default)]
pub struct InMemoryThreadRepository {
    threads: RwLock<HashMap<Uuid, Thread>>,
}

#[async_trait::async_trait]
impl ThreadRepository for InMemoryThreadRepository {
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Thread>, RepositoryError> {
        let threads = self.threads.read().await;
        Ok(threads.get(id).cloned())
    }

    async fn save(&self, thread: Thread) -> Result<(), RepositoryError> {
        let mut threads = self.threads.write().await;
        threads.insert(thread.id, thread);
        Ok(())
    }

    async fn list_for_user_config(
        &self,
        user_config_id: &Uuid,
    ) -> Result<Vec<Thread>, RepositoryError> {
        let threads = self.threads.read().await;
        let mut owned: Vec<Thread> = threads
            .values()
            .filter(|thread| thread.user_config_id == *user_config_id)
            .cloned()
            .collect();
        owned.sort_by_key(|thread| thread.created_at);
        Ok(owned)
    }
}

#[derive(Default)]
pub struct InMemoryCheckpointRepository {
    checkpoints: RwLock<HashMap<Uuid, CheckpointRecord>>,
}

#[async_trait::async_trait]
impl CheckpointRepository for InMemoryCheckpointRepository {
    async fn load(&self, thread_id: &Uuid) -> Result<Option<CheckpointRecord>, RepositoryError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(thread_id).cloned())
    }

    async fn save(&self, record: CheckpointRecord) -> Result<(), RepositoryError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(record.thread_id, record);
        Ok(())
    }

    async fn delete(&self, thread_id: &Uuid) -> Result<(), RepositoryError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.remove(thread_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDocumentChunkRepository {
    chunks: RwLock<HashMap<Uuid, DocumentChunk>>,
}

#[async_trait::async_trait]
impl DocumentChunkRepository for InMemoryDocumentChunkRepository {
    async fn save(&self, chunk: DocumentChunk) -> Result<(), RepositoryError> {
        let mut chunks = self.chunks.write().await;
        chunks.insert(chunk.id, chunk);
        Ok(())
    }

    async fn list_matching(
        &self,
        filters: &Map<String, Value>,
    ) -> Result<Vec<DocumentChunk>, RepositoryError> {
        let chunks = self.chunks.read().await;
        let mut matching: Vec<DocumentChunk> = chunks
            .values()
            .filter(|chunk| metadata_matches(&chunk.metadata, filters))
            .cloned()
            .collect();
        matching.sort_by_key(|chunk| chunk.created_at);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{json, Map};
    use uuid::Uuid;

    use concierge_core::{Thread, UserConfig};

    use crate::repositories::{
        CheckpointRecord, CheckpointRepository, DocumentChunk, DocumentChunkRepository,
        InMemoryCheckpointRepository, InMemoryDocumentChunkRepository, InMemoryThreadRepository,
        InMemoryUserConfigRepository, ThreadRepository, UserConfigRepository,
    };

    #[tokio::test]
    async fn in_memory_user_config_repo_round_trip() {
        let repo = InMemoryUserConfigRepository::default();
        let now = Utc::now();
        let user_config = UserConfig {
            id: Uuid::new_v4(),
            description: Some("demo".to_string()),
            config: Map::new(),
            active: true,
            created_at: now,
            updated_at: now,
        };

        repo.save(user_config.clone()).await.expect("save");
        let found = repo.find_by_id(&user_config.id).await.expect("find");

        assert_eq!(found, Some(user_config));
    }

    #[tokio::test]
    async fn in_memory_thread_repo_round_trip() {
        let repo = InMemoryThreadRepository::default();
        let thread = Thread::new(Uuid::new_v4(), Map::new());

        repo.save(thread.clone()).await.expect("save");
        let found = repo.find_by_id(&thread.id).await.expect("find");

        assert_eq!(found, Some(thread));
    }

    #[tokio::test]
    async fn in_memory_checkpoint_repo_round_trip() {
        let repo = InMemoryCheckpointRepository::default();
        let record = CheckpointRecord::new(Uuid::new_v4(), json!({"messages": []}), None);

        repo.save(record.clone()).await.expect("save");
        let found = repo.load(&record.thread_id).await.expect("load");
        assert_eq!(found, Some(record.clone()));

        repo.delete(&record.thread_id).await.expect("delete");
        assert!(repo.load(&record.thread_id).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn in_memory_chunk_repo_filters_by_metadata() {
        let repo = InMemoryDocumentChunkRepository::default();
        let mut metadata = Map::new();
        metadata.insert("user_config_id".to_string(), json!("cfg-1"));
        let chunk = DocumentChunk::new("attendee-profiles", "a chunk", metadata.clone());
        let other = DocumentChunk::new("attendee-profiles", "another chunk", Map::new());

        repo.save(chunk.clone()).await.expect("save chunk");
        repo.save(other).await.expect("save other");

        let listed = repo.list_matching(&metadata).await.expect("list");
        assert_eq!(listed, vec![chunk]);
    }
}
