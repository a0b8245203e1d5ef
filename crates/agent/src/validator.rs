use std::collections::HashSet;

use serde_json::Value;

use concierge_core::{Message, ToolCallRequest};

use crate::metadata::ToolMetadataSet;

/// Structural validation for proposed tool invocations. One instance lives
/// for the duration of a turn-driving process; repeated validation of the
/// same call id short-circuits to "proceed" so retried graph steps never
/// re-emit errors.
pub struct ToolValidator {
    seen_call_ids: HashSet<String>,
}

impl ToolValidator {
    pub fn new() -> Self {
        Self { seen_call_ids: HashSet::new() }
    }

    /// Returns `None` when the call may proceed, or a synthesized error
    /// tool-result that answers the call without executing it.
    pub fn validate(
        &mut self,
        call: &ToolCallRequest,
        metadata: &ToolMetadataSet,
    ) -> Option<Message> {
        if !self.seen_call_ids.insert(call.id.clone()) {
            return None;
        }

        let tool_metadata = match metadata.get(&call.name) {
            Ok(tool_metadata) => tool_metadata,
            Err(_) => {
                let available = metadata.names().join(", ");
                return Some(Message::tool_error(
                    &call.id,
                    &call.name,
                    format!("Error: {} is not a valid tool, try one of [{available}].", call.name),
                ));
            }
        };

        let complaints: Vec<String> = tool_metadata
            .required_args
            .iter()
            .filter(|arg| is_blank(call.args.get(arg.as_str())))
            .map(|arg| format!("You need to specify a value for {arg}"))
            .collect();

        if complaints.is_empty() {
            None
        } else {
            Some(Message::tool_error(
                &call.id,
                &call.name,
                format!("{}.", complaints.join(". ")),
            ))
        }
    }
}

impl Default for ToolValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use concierge_core::{Message, ToolCallRequest, ToolStatus};

    use super::ToolValidator;
    use crate::metadata::{ToolMetadata, ToolMetadataSet};

    fn metadata_with(names_and_args: &[(&str, &[&str])]) -> ToolMetadataSet {
        names_and_args.iter().fold(ToolMetadataSet::new(), |set, (name, args)| {
            set.with_tool(
                *name,
                ToolMetadata {
                    required_args: args.iter().map(|a| a.to_string()).collect(),
                    return_direct: false,
                    interrupt: None,
                    display_message: format!("Running {name}"),
                },
            )
        })
    }

    fn error_content(message: &Message) -> &str {
        match message {
            Message::ToolResult { status: ToolStatus::Error, content, .. } => content,
            other => panic!("expected error tool result, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tool_lists_available_names() {
        let metadata = metadata_with(&[("bar", &[]), ("baz", &[])]);
        let mut validator = ToolValidator::new();
        let call = ToolCallRequest::new("c1", "foo", Map::new());

        let result = validator.validate(&call, &metadata).expect("should reject");
        assert_eq!(
            error_content(&result),
            "Error: foo is not a valid tool, try one of [bar, baz]."
        );
    }

    #[test]
    fn missing_and_blank_required_args_are_reported_together() {
        let metadata = metadata_with(&[("schedule", &["date", "time"])]);
        let mut validator = ToolValidator::new();
        let mut args = Map::new();
        args.insert("date".to_string(), json!(""));
        let call = ToolCallRequest::new("c1", "schedule", args);

        let result = validator.validate(&call, &metadata).expect("should reject");
        assert_eq!(
            error_content(&result),
            "You need to specify a value for date. You need to specify a value for time."
        );
    }

    #[test]
    fn whitespace_only_argument_counts_as_blank() {
        let metadata = metadata_with(&[("schedule", &["date"])]);
        let mut validator = ToolValidator::new();
        let mut args = Map::new();
        args.insert("date".to_string(), json!("   "));
        let call = ToolCallRequest::new("c1", "schedule", args);

        let result = validator.validate(&call, &metadata).expect("should reject");
        assert_eq!(error_content(&result), "You need to specify a value for date.");
    }

    #[test]
    fn non_string_argument_values_satisfy_the_requirement() {
        let metadata = metadata_with(&[("schedule", &["attendees"])]);
        let mut validator = ToolValidator::new();
        let mut args = Map::new();
        args.insert("attendees".to_string(), json!(["ada", "grace"]));
        let call = ToolCallRequest::new("c1", "schedule", args);

        assert!(validator.validate(&call, &metadata).is_none());
    }

    #[test]
    fn revalidating_the_same_call_id_short_circuits_to_proceed() {
        let metadata = metadata_with(&[("bar", &[])]);
        let mut validator = ToolValidator::new();
        let call = ToolCallRequest::new("c1", "foo", Map::new());

        assert!(validator.validate(&call, &metadata).is_some());
        assert!(validator.validate(&call, &metadata).is_none(), "second pass must proceed");
    }
}
