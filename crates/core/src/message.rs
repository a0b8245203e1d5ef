use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A tool invocation requested by the model. `id` is unique within a turn
/// and ties the eventual tool result back to this request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self { id: id.into(), name: name.into(), args }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Canonical conversation message. History is append-only; tool results are
/// identified by the `tool_call_id` they answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        text: String,
    },
    Assistant {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author_name: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        status: ToolStatus,
        content: String,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant { text: text.into(), author_name: None, tool_calls: Vec::new() }
    }

    pub fn assistant_with_tool_calls(
        text: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self::Assistant { text: text.into(), author_name: None, tool_calls }
    }

    pub fn tool_success(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            status: ToolStatus::Success,
            content: content.into(),
        }
    }

    pub fn tool_error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            content: content.into(),
        }
    }

    /// Tool calls requested by this message, empty for non-assistant messages.
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HistoryIntegrityError {
    #[error(
        "assistant tool calls without a matching tool result: [{}]. Every tool call in the \
         history must be answered by exactly one tool result before the model can be invoked.",
        .0.join(", ")
    )]
    UnansweredToolCalls(Vec<String>),
    #[error(
        "tool call ids answered by more than one tool result: [{}]",
        .0.join(", ")
    )]
    DuplicateToolResults(Vec<String>),
}

/// Checks the pairing invariant: every tool call emitted by an assistant
/// message must have exactly one corresponding tool result in the history.
pub fn validate_history(messages: &[Message]) -> Result<(), HistoryIntegrityError> {
    let mut result_counts: std::collections::HashMap<&str, usize> =
        std::collections::HashMap::new();
    for message in messages {
        if let Message::ToolResult { tool_call_id, .. } = message {
            *result_counts.entry(tool_call_id.as_str()).or_default() += 1;
        }
    }

    let unanswered: Vec<String> = messages
        .iter()
        .flat_map(Message::tool_calls)
        .filter(|call| !result_counts.contains_key(call.id.as_str()))
        .map(|call| call.id.clone())
        .collect();
    if !unanswered.is_empty() {
        return Err(HistoryIntegrityError::UnansweredToolCalls(unanswered));
    }

    let mut duplicated: Vec<String> = result_counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id.to_string())
        .collect();
    if !duplicated.is_empty() {
        duplicated.sort();
        return Err(HistoryIntegrityError::DuplicateToolResults(duplicated));
    }

    Ok(())
}
