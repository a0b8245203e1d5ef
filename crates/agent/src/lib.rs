//! Agent Runtime - tool-augmented conversation orchestration
//!
//! This crate is the "brain" of the concierge system - the turn engine that:
//! - Invokes the chat model with the registered tool schemas
//! - Validates and gates the model's tool-call requests
//! - Executes approved sibling calls concurrently
//! - Surfaces direct tool outputs as assistant messages
//! - Checkpoints conversation state between turns, including mid-turn
//!   suspensions awaiting human approval
//!
//! # Architecture
//!
//! A turn is a constrained loop (see `graph`):
//! 1. **Inference** (`llm`) - Invoke the model with history and tool schemas
//! 2. **Validation** (`validator`) - Reject unknown tools and blank arguments
//! 3. **Gating** (`interrupt`) - Pause gated calls for human approval
//! 4. **Execution** (`executor`) - Run approved calls concurrently
//! 5. **Rewriting** (`direct_output`) - Promote direct results to replies
//!
//! The loop repeats until the model answers without requesting tools, or a
//! gate suspends the turn. `TurnRunner` (see `runner`) wraps the loop with
//! checkpoint persistence and the streamed event channel.
//!
//! # Key Types
//!
//! - `TurnRunner` - Entry point for driving one user turn
//! - `ConversationGraph` - The state machine itself
//! - `ChatModel` - Pluggable trait over OpenAI-compatible backends
//! - `ToolRegistry` / `ToolMetadataSet` - The callable surface and its policy

pub mod direct_output;
pub mod executor;
pub mod graph;
pub mod interrupt;
pub mod llm;
pub mod metadata;
pub mod prompts;
pub mod retrieval;
pub mod runner;
pub mod state;
pub mod toolkit;
pub mod tools;
pub mod validator;

pub use graph::{ConversationGraph, GraphOutcome, ResumeContext};
pub use interrupt::CANCELLATION_MESSAGE;
pub use llm::{build_chat_model, AssistantTurn, ChatModel, ModelError};
pub use metadata::{InterruptSpec, MetadataError, ToolMetadata, ToolMetadataSet};
pub use retrieval::{RepositoryRetriever, RetrievalError, Retriever, ScoredChunk};
pub use runner::{TurnError, TurnEvent, TurnRunner};
pub use state::{Checkpoint, CheckpointError, CheckpointStore, ConversationState, Suspension};
pub use toolkit::{standard_metadata, standard_registry, MeetingsApiClient};
pub use tools::{Tool, ToolError, ToolRegistry, ToolSchema};
pub use validator::ToolValidator;
