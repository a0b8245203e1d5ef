use serde_json::{Map, Value};

use concierge_core::{Message, ToolStatus};

use crate::metadata::ToolMetadataSet;
use crate::state::ConversationState;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DirectOutputError {
    #[error("direct-output rewrite entered with an empty message history")]
    EmptyHistory,
}

/// Promotes trailing return-direct tool results to assistant messages so the
/// presentation layer can render them without another model round-trip.
///
/// Walks backward over the contiguous run of tool results at the end of the
/// history; each one whose metadata marks `return_direct` and whose status
/// is success gets an assistant message `{"tool_name": ..., "data": ...}`
/// appended, in the order the results appear. Returns the messages it
/// appended so the caller can stream them.
pub fn rewrite_direct_outputs(
    state: &mut ConversationState,
    metadata: &ToolMetadataSet,
    author_name: &str,
) -> Result<Vec<Message>, DirectOutputError> {
    if state.messages.is_empty() {
        return Err(DirectOutputError::EmptyHistory);
    }

    let trailing_start = state
        .messages
        .iter()
        .rposition(|message| !message.is_tool_result())
        .map(|position| position + 1)
        .unwrap_or(0);

    let mut appended = Vec::new();
    for message in &state.messages[trailing_start..] {
        let Message::ToolResult { tool_name, status, content, .. } = message else {
            continue;
        };
        let return_direct =
            metadata.get(tool_name).map(|entry| entry.return_direct).unwrap_or(false);
        if !return_direct || *status != ToolStatus::Success {
            continue;
        }

        let data: Value =
            serde_json::from_str(content).unwrap_or_else(|_| Value::String(content.clone()));
        let mut body = Map::new();
        body.insert("tool_name".to_string(), Value::String(tool_name.clone()));
        body.insert("data".to_string(), data);

        appended.push(Message::Assistant {
            text: Value::Object(body).to_string(),
            author_name: Some(author_name.to_string()),
            tool_calls: Vec::new(),
        });
    }

    state.messages.extend(appended.iter().cloned());
    Ok(appended)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use concierge_core::Message;

    use super::{rewrite_direct_outputs, DirectOutputError};
    use crate::metadata::{ToolMetadata, ToolMetadataSet};
    use crate::state::ConversationState;

    fn metadata(return_direct: bool) -> ToolMetadataSet {
        ToolMetadataSet::new().with_tool(
            "lookup",
            ToolMetadata {
                required_args: vec![],
                return_direct,
                interrupt: None,
                display_message: "Looking up".to_string(),
            },
        )
    }

    #[test]
    fn successful_return_direct_result_becomes_an_assistant_message() {
        let mut state = ConversationState::default();
        state.push(Message::user("look it up"));
        state.push(Message::tool_success("c1", "lookup", r#"{"x":1}"#));

        let appended =
            rewrite_direct_outputs(&mut state, &metadata(true), "concierge").expect("rewrite");

        assert_eq!(appended.len(), 1);
        match &appended[0] {
            Message::Assistant { text, author_name, .. } => {
                let body: serde_json::Value = serde_json::from_str(text).expect("json body");
                assert_eq!(body, json!({"tool_name": "lookup", "data": {"x": 1}}));
                assert_eq!(author_name.as_deref(), Some("concierge"));
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
        assert_eq!(state.messages.len(), 3);
    }

    #[test]
    fn non_return_direct_results_are_left_alone() {
        let mut state = ConversationState::default();
        state.push(Message::user("look it up"));
        state.push(Message::tool_success("c1", "lookup", r#"{"x":1}"#));

        let appended =
            rewrite_direct_outputs(&mut state, &metadata(false), "concierge").expect("rewrite");

        assert!(appended.is_empty());
        assert_eq!(state.messages.len(), 2);
    }

    #[test]
    fn error_results_are_never_promoted() {
        let mut state = ConversationState::default();
        state.push(Message::user("look it up"));
        state.push(Message::tool_error("c1", "lookup", "upstream failure"));

        let appended =
            rewrite_direct_outputs(&mut state, &metadata(true), "concierge").expect("rewrite");

        assert!(appended.is_empty());
    }

    #[test]
    fn only_the_trailing_run_is_considered() {
        let mut state = ConversationState::default();
        state.push(Message::tool_success("c0", "lookup", r#"{"old":true}"#));
        state.push(Message::assistant("intervening reply"));
        state.push(Message::tool_success("c1", "lookup", r#"{"new":true}"#));

        let appended =
            rewrite_direct_outputs(&mut state, &metadata(true), "concierge").expect("rewrite");

        assert_eq!(appended.len(), 1);
        match &appended[0] {
            Message::Assistant { text, .. } => {
                assert!(text.contains(r#""new":true"#));
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
    }

    #[test]
    fn empty_history_is_an_internal_consistency_failure() {
        let mut state = ConversationState::default();

        let result = rewrite_direct_outputs(&mut state, &metadata(true), "concierge");
        assert_eq!(result, Err(DirectOutputError::EmptyHistory));
    }

    #[test]
    fn non_json_content_is_wrapped_as_a_string() {
        let mut state = ConversationState::default();
        state.push(Message::user("look it up"));
        state.push(Message::tool_success("c1", "lookup", "plain text payload"));

        let appended =
            rewrite_direct_outputs(&mut state, &metadata(true), "concierge").expect("rewrite");

        match &appended[0] {
            Message::Assistant { text, .. } => {
                let body: serde_json::Value = serde_json::from_str(text).expect("json body");
                assert_eq!(body["data"], json!("plain text payload"));
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
    }
}
