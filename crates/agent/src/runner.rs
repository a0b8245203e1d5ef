use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use concierge_core::{HistoryIntegrityError, Message, ToolStatus};

use crate::direct_output::DirectOutputError;
use crate::graph::{ConversationGraph, GraphOutcome, ResumeContext};
use crate::llm::ModelError;
use crate::metadata::{MetadataError, ToolMetadataSet};
use crate::state::{Checkpoint, CheckpointError, CheckpointStore, Suspension};

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("chat history failed integrity validation: {0}")]
    InvalidChatHistory(#[from] HistoryIntegrityError),
    #[error("no metadata for tool `{0}`")]
    UnknownTool(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    DirectOutput(#[from] DirectOutputError),
    #[error("internal state violation: {0}")]
    Internal(String),
    #[error("event stream closed by the receiver")]
    StreamClosed,
}

impl From<MetadataError> for TurnError {
    fn from(error: MetadataError) -> Self {
        match error {
            MetadataError::UnknownTool(name) => Self::UnknownTool(name),
        }
    }
}

/// Incremental turn output, pushed over an `mpsc` channel as produced.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    /// An assistant-authored text fragment.
    Text(String),
    /// A tool call resolved during the turn.
    ToolCall { name: String, tool_call_id: String, status: ToolStatus, description: String },
    /// Final event of a suspended turn: the pending approval request.
    Interrupt(Value),
    /// Final event of a fatally failed turn.
    Error(String),
}

impl TurnEvent {
    /// Wire shape streamed to clients, one JSON object per event.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Text(text) => json!({ "text": text }),
            Self::ToolCall { name, tool_call_id, status, description } => json!({
                "tool_call": {
                    "name": name,
                    "tool_call_id": tool_call_id,
                    "status": status,
                    "description": description,
                }
            }),
            Self::Interrupt(payload) => payload.clone(),
            Self::Error(message) => json!({ "error": message }),
        }
    }
}

/// Top-level turn driver: loads the thread's checkpoint, decides between
/// resuming a parked approval and starting a fresh turn, drives the graph,
/// and persists the outcome.
pub struct TurnRunner {
    graph: ConversationGraph,
    checkpoints: CheckpointStore,
    metadata: Arc<ToolMetadataSet>,
}

impl TurnRunner {
    pub fn new(
        graph: ConversationGraph,
        checkpoints: CheckpointStore,
        metadata: Arc<ToolMetadataSet>,
    ) -> Self {
        Self { graph, checkpoints, metadata }
    }

    /// Runs one turn, streaming events into `events`. Fatal errors are
    /// surfaced on the stream before the channel closes and also returned.
    pub async fn run(
        &self,
        thread_id: Uuid,
        input: &str,
        user_data: &Map<String, Value>,
        events: mpsc::Sender<TurnEvent>,
    ) -> Result<(), TurnError> {
        tracing::info!(event_name = "agent.turn.start", thread_id = %thread_id);
        match self.drive(thread_id, input, user_data, &events).await {
            Ok(()) => {
                tracing::info!(event_name = "agent.turn.finished", thread_id = %thread_id);
                Ok(())
            }
            Err(TurnError::StreamClosed) => Err(TurnError::StreamClosed),
            Err(error) => {
                tracing::error!(
                    event_name = "agent.turn.failed",
                    thread_id = %thread_id,
                    error = %error,
                );
                let _ = events.send(TurnEvent::Error(error.to_string())).await;
                Err(error)
            }
        }
    }

    async fn drive(
        &self,
        thread_id: Uuid,
        input: &str,
        user_data: &Map<String, Value>,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<(), TurnError> {
        let mut checkpoint =
            self.checkpoints.load(&thread_id).await?.unwrap_or_default();

        let resume = match checkpoint.suspended.take() {
            Some(suspension) => self.resume_context(&checkpoint, suspension, input)?,
            None => None,
        };

        let mut state = checkpoint.state;
        if resume.is_none() {
            state.push(Message::user(input));
        }

        match self.graph.run(&mut state, user_data, resume, events).await? {
            GraphOutcome::Completed => {
                self.checkpoints
                    .save(&thread_id, &Checkpoint { state, suspended: None })
                    .await?;
            }
            GraphOutcome::Suspended(suspension) => {
                let payload = suspension.payload.clone();
                self.checkpoints
                    .save(&thread_id, &Checkpoint { state, suspended: Some(suspension) })
                    .await?;
                events
                    .send(TurnEvent::Interrupt(payload))
                    .await
                    .map_err(|_| TurnError::StreamClosed)?;
            }
        }
        Ok(())
    }

    /// A parked checkpoint resumes only when the pending call is still
    /// interruptible; the new input then acts as the approval signal.
    /// Approval is granted iff the trimmed input equals the tool's
    /// configured continue token. Missing tool metadata here means the
    /// persisted state no longer matches the configuration, which must not
    /// be silently swallowed.
    fn resume_context(
        &self,
        checkpoint: &Checkpoint,
        suspension: Suspension,
        input: &str,
    ) -> Result<Option<ResumeContext>, TurnError> {
        let Some(Message::Assistant { tool_calls, .. }) = checkpoint.state.last() else {
            return Ok(None);
        };
        let Some(pending_call) = tool_calls.get(suspension.cursor) else {
            return Ok(None);
        };

        let metadata = self.metadata.get(&pending_call.name)?;
        let Some(spec) = &metadata.interrupt else {
            return Ok(None);
        };

        let approved = input.trim() == spec.continue_token;
        tracing::info!(
            event_name = "agent.interrupt.resumed",
            tool = %pending_call.name,
            approved,
        );
        Ok(Some(ResumeContext {
            approved,
            resolved: suspension.resolved,
            cursor: suspension.cursor,
        }))
    }
}
