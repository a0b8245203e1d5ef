use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use concierge_core::Message;
use concierge_db::repositories::{CheckpointRecord, CheckpointRepository};

/// The full conversational memory for one thread. Mutated only by the state
/// machine, one turn at a time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
}

impl ConversationState {
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// A parked turn awaiting human approval. `resolved` holds the tool results
/// already produced for sibling calls so they are never executed twice;
/// `cursor` is the index of the call that raised the approval request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    pub payload: Value,
    pub resolved: Vec<Message>,
    pub cursor: usize,
}

/// Durable per-thread snapshot: message history plus the pending-interrupt
/// marker. Saved at every suspension point and at turn completion.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: ConversationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<Suspension>,
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint persistence failure: {0}")]
    Persistence(String),
    #[error("checkpoint for thread {thread_id} is corrupt: {reason}")]
    Corrupt { thread_id: Uuid, reason: String },
}

/// Typed facade over the raw checkpoint rows. The repository stores opaque
/// JSON; this layer owns the `Checkpoint` shape.
#[derive(Clone)]
pub struct CheckpointStore {
    repository: Arc<dyn CheckpointRepository>,
}

impl CheckpointStore {
    pub fn new(repository: Arc<dyn CheckpointRepository>) -> Self {
        Self { repository }
    }

    pub async fn load(&self, thread_id: &Uuid) -> Result<Option<Checkpoint>, CheckpointError> {
        let record = self
            .repository
            .load(thread_id)
            .await
            .map_err(|e| CheckpointError::Persistence(e.to_string()))?;

        let Some(record) = record else {
            return Ok(None);
        };

        let state: ConversationState = serde_json::from_value(record.state).map_err(|e| {
            CheckpointError::Corrupt { thread_id: *thread_id, reason: e.to_string() }
        })?;
        let suspended: Option<Suspension> = record
            .suspended
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| CheckpointError::Corrupt { thread_id: *thread_id, reason: e.to_string() })?;

        Ok(Some(Checkpoint { state, suspended }))
    }

    pub async fn save(
        &self,
        thread_id: &Uuid,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        let state = serde_json::to_value(&checkpoint.state)
            .map_err(|e| CheckpointError::Persistence(e.to_string()))?;
        let suspended = checkpoint
            .suspended
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| CheckpointError::Persistence(e.to_string()))?;

        self.repository
            .save(CheckpointRecord::new(*thread_id, state, suspended))
            .await
            .map_err(|e| CheckpointError::Persistence(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use uuid::Uuid;

    use concierge_core::Message;
    use concierge_db::repositories::InMemoryCheckpointRepository;

    use super::{Checkpoint, CheckpointStore, ConversationState, Suspension};

    #[tokio::test]
    async fn checkpoint_round_trips_through_the_store() {
        let store = CheckpointStore::new(Arc::new(InMemoryCheckpointRepository::default()));
        let thread_id = Uuid::new_v4();

        let mut state = ConversationState::default();
        state.push(Message::user("book a meeting"));
        let checkpoint = Checkpoint {
            state,
            suspended: Some(Suspension {
                payload: json!({"action": "ask_for_human_approval"}),
                resolved: vec![Message::tool_success("c1", "lookup", "{}")],
                cursor: 1,
            }),
        };

        store.save(&thread_id, &checkpoint).await.expect("save");
        let loaded = store.load(&thread_id).await.expect("load").expect("present");

        assert_eq!(loaded, checkpoint);
    }

    #[tokio::test]
    async fn missing_checkpoint_is_none() {
        let store = CheckpointStore::new(Arc::new(InMemoryCheckpointRepository::default()));

        let loaded = store.load(&Uuid::new_v4()).await.expect("load");
        assert!(loaded.is_none());
    }
}
