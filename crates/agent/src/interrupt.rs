use serde_json::{Map, Value};

use concierge_core::{Message, ToolCallRequest};

use crate::metadata::ToolMetadata;

pub const CANCELLATION_MESSAGE: &str =
    "User has decided to cancel the action. Continue assisting, accounting for the user's input.";

/// Outcome of gating one validated tool call.
#[derive(Clone, Debug, PartialEq)]
pub enum GateOutcome {
    /// No approval needed, or approval already granted. Carries the call
    /// ready for execution.
    Proceed(ToolCallRequest),
    /// The user declined. The call is answered without executing.
    Denied(Message),
    /// Park the turn; the payload is surfaced to the caller as an approval
    /// request.
    Suspend(Value),
}

/// Decides whether a validated call may run now, must wait for a human, or
/// was just denied. `approval` is `Some` only when this call is the one a
/// previous suspension parked on.
pub fn gate(
    call: &ToolCallRequest,
    metadata: &ToolMetadata,
    approval: Option<bool>,
    user_data: &Map<String, Value>,
) -> GateOutcome {
    let Some(spec) = &metadata.interrupt else {
        return GateOutcome::Proceed(with_user_data(call, user_data));
    };

    match approval {
        None => GateOutcome::Suspend(approval_payload(call, spec)),
        Some(false) => {
            GateOutcome::Denied(Message::tool_error(&call.id, &call.name, CANCELLATION_MESSAGE))
        }
        Some(true) => GateOutcome::Proceed(with_user_data(call, user_data)),
    }
}

fn approval_payload(call: &ToolCallRequest, spec: &crate::metadata::InterruptSpec) -> Value {
    let mut payload = Map::new();
    payload.insert("action".to_string(), Value::String("ask_for_human_approval".to_string()));
    payload.insert("prompt".to_string(), Value::String(spec.prompt.clone()));
    payload.insert("continue".to_string(), Value::String(spec.continue_token.clone()));
    payload.insert("args".to_string(), Value::Object(call.args.clone()));
    Value::Object(payload)
}

/// Injects the merged per-thread configuration under the `user_data`
/// argument key. Tools that do not declare the key simply ignore it.
fn with_user_data(call: &ToolCallRequest, user_data: &Map<String, Value>) -> ToolCallRequest {
    let mut prepared = call.clone();
    if !user_data.is_empty() {
        prepared.args.insert("user_data".to_string(), Value::Object(user_data.clone()));
    }
    prepared
}
