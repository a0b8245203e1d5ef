use tokio::task::JoinSet;

use concierge_core::{Message, ToolCallRequest};

use crate::tools::ToolRegistry;

/// Runs a batch of validated, approved sibling calls concurrently. Results
/// come back keyed by their position in the requesting step so the caller
/// can restore request order; side-effect ordering between siblings is
/// deliberately unspecified.
pub async fn execute_batch(
    registry: &ToolRegistry,
    batch: Vec<(usize, ToolCallRequest)>,
) -> Vec<(usize, Message)> {
    let mut join_set = JoinSet::new();

    for (index, call) in batch {
        match registry.get(&call.name) {
            Some(tool) => {
                join_set.spawn(async move {
                    let result = tool.call(&call.args).await;
                    let message = match result {
                        Ok(value) => Message::tool_success(&call.id, &call.name, value.to_string()),
                        Err(error) => Message::tool_error(&call.id, &call.name, error.to_string()),
                    };
                    (index, message)
                });
            }
            None => {
                // The validator admits only metadata-registered names; a
                // registry gap at this point is a wiring mistake.
                join_set.spawn(async move {
                    (
                        index,
                        Message::tool_error(
                            &call.id,
                            &call.name,
                            format!("tool `{}` is not wired to an implementation", call.name),
                        ),
                    )
                });
            }
        }
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(entry) => results.push(entry),
            Err(join_error) => {
                tracing::error!(event_name = "agent.executor.join_failed", error = %join_error);
            }
        }
    }
    results.sort_by_key(|(index, _)| *index);
    results
}
