use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use concierge_core::{validate_history, Message, ToolCallRequest, ToolStatus};

use crate::direct_output::rewrite_direct_outputs;
use crate::executor::execute_batch;
use crate::interrupt::{gate, GateOutcome};
use crate::llm::ChatModel;
use crate::metadata::ToolMetadataSet;
use crate::prompts::render_system_prompt;
use crate::runner::{TurnError, TurnEvent};
use crate::state::{ConversationState, Suspension};
use crate::tools::ToolRegistry;
use crate::validator::ToolValidator;

/// How a graph drive ended: the model produced a plain reply, or the turn
/// parked on a pending human approval.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphOutcome {
    Completed,
    Suspended(Suspension),
}

/// Approval signal reconciling a suspended tools step. `resolved` carries
/// the sibling results finalized before the suspension; `cursor` indexes
/// the call the approval answers.
#[derive(Clone, Debug, PartialEq)]
pub struct ResumeContext {
    pub approved: bool,
    pub resolved: Vec<Message>,
    pub cursor: usize,
}

enum ToolsStep {
    Completed(Vec<Message>),
    Suspended(Suspension),
}

/// The conversation state machine: assistant inference, tool resolution,
/// direct-output rewriting, looping until the model stops requesting tools
/// or a gate suspends the turn.
pub struct ConversationGraph {
    model: Arc<dyn ChatModel>,
    registry: ToolRegistry,
    metadata: Arc<ToolMetadataSet>,
    assistant_name: String,
    system_prompt: String,
}

impl ConversationGraph {
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: ToolRegistry,
        metadata: Arc<ToolMetadataSet>,
        assistant_name: impl Into<String>,
    ) -> Self {
        let system_prompt = render_system_prompt(&registry.names());
        Self { model, registry, metadata, assistant_name: assistant_name.into(), system_prompt }
    }

    /// Drives the state machine until terminal or suspension, pushing
    /// events as they are produced.
    pub async fn run(
        &self,
        state: &mut ConversationState,
        user_data: &Map<String, Value>,
        resume: Option<ResumeContext>,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<GraphOutcome, TurnError> {
        let mut validator = ToolValidator::new();
        let mut pending_step: Option<(Vec<ToolCallRequest>, Vec<Message>, Option<bool>)> =
            match resume {
                Some(context) => {
                    let calls = pending_calls(state)?;
                    Some((calls, context.resolved, Some(context.approved)))
                }
                None => None,
            };

        loop {
            let (calls, prior, approval) = match pending_step.take() {
                Some(step) => step,
                None => {
                    validate_history(&state.messages)?;

                    let turn = self
                        .model
                        .invoke(&self.system_prompt, &self.registry.schemas(), &state.messages)
                        .await?;
                    tracing::debug!(
                        event_name = "agent.model.responded",
                        tool_calls = turn.tool_calls.len(),
                    );

                    state.push(Message::Assistant {
                        text: turn.text.clone(),
                        author_name: Some(self.assistant_name.clone()),
                        tool_calls: turn.tool_calls.clone(),
                    });
                    if !turn.text.is_empty() {
                        emit(events, TurnEvent::Text(turn.text)).await?;
                    }
                    if turn.tool_calls.is_empty() {
                        return Ok(GraphOutcome::Completed);
                    }
                    (turn.tool_calls, Vec::new(), None)
                }
            };

            match self
                .run_tools_step(&mut validator, &calls, prior, approval, user_data, events)
                .await?
            {
                ToolsStep::Suspended(suspension) => {
                    tracing::info!(event_name = "agent.interrupt.raised");
                    return Ok(GraphOutcome::Suspended(suspension));
                }
                ToolsStep::Completed(results) => {
                    state.messages.extend(results);
                    let appended = rewrite_direct_outputs(
                        state,
                        &self.metadata,
                        &self.assistant_name,
                    )?;
                    for message in appended {
                        if let Message::Assistant { text, .. } = message {
                            emit(events, TurnEvent::Text(text)).await?;
                        }
                    }
                }
            }
        }
    }

    /// Resolves one step's sibling calls. Validation and gating run
    /// sequentially in request order (the gate is a suspension point);
    /// approved calls execute concurrently. When a gate fires, every call
    /// approved before it is executed first so the suspension carries only
    /// final results.
    async fn run_tools_step(
        &self,
        validator: &mut ToolValidator,
        calls: &[ToolCallRequest],
        prior: Vec<Message>,
        mut approval: Option<bool>,
        user_data: &Map<String, Value>,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<ToolsStep, TurnError> {
        let mut slots: Vec<Option<Message>> = calls.iter().map(|_| None).collect();
        for (index, message) in prior.into_iter().enumerate() {
            if index < slots.len() {
                slots[index] = Some(message);
            }
        }

        let mut batch: Vec<(usize, ToolCallRequest)> = Vec::new();
        let mut produced: Vec<usize> = Vec::new();

        for (index, call) in calls.iter().enumerate() {
            if slots[index].is_some() {
                continue;
            }

            if let Some(error_result) = validator.validate(call, &self.metadata) {
                slots[index] = Some(error_result);
                produced.push(index);
                continue;
            }

            let tool_metadata = self.metadata.get(&call.name)?;
            let call_approval =
                if tool_metadata.interrupt.is_some() { approval.take() } else { None };

            match gate(call, tool_metadata, call_approval, user_data) {
                GateOutcome::Proceed(prepared) => batch.push((index, prepared)),
                GateOutcome::Denied(result) => {
                    slots[index] = Some(result);
                    produced.push(index);
                }
                GateOutcome::Suspend(payload) => {
                    for (batch_index, message) in
                        execute_batch(&self.registry, batch).await
                    {
                        slots[batch_index] = Some(message);
                        produced.push(batch_index);
                    }
                    self.emit_notices(&slots, &produced, calls, events).await?;

                    let resolved = collect_final(slots, index)?;
                    return Ok(ToolsStep::Suspended(Suspension {
                        payload,
                        resolved,
                        cursor: index,
                    }));
                }
            }
        }

        for (batch_index, message) in execute_batch(&self.registry, batch).await {
            slots[batch_index] = Some(message);
            produced.push(batch_index);
        }
        self.emit_notices(&slots, &produced, calls, events).await?;

        let results = collect_final(slots, calls.len())?;
        Ok(ToolsStep::Completed(results))
    }

    /// Tool-call notices for the results produced in this step run, in
    /// request order, enriched with the tool's display description.
    /// Error-status results stay out of the stream; they reach the model
    /// through history and surface only as its adapted reply.
    async fn emit_notices(
        &self,
        slots: &[Option<Message>],
        produced: &[usize],
        calls: &[ToolCallRequest],
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<(), TurnError> {
        let mut indexes: Vec<usize> = produced.to_vec();
        indexes.sort_unstable();
        indexes.dedup();

        for index in indexes {
            let Some(Message::ToolResult { tool_call_id, tool_name, status, .. }) =
                slots[index].as_ref()
            else {
                continue;
            };
            if *status == ToolStatus::Error {
                continue;
            }
            let description = self
                .metadata
                .get(&calls[index].name)
                .map(|entry| entry.display_message.clone())
                .unwrap_or_default();
            emit(
                events,
                TurnEvent::ToolCall {
                    name: tool_name.clone(),
                    tool_call_id: tool_call_id.clone(),
                    status: *status,
                    description,
                },
            )
            .await?;
        }
        Ok(())
    }
}

fn pending_calls(state: &ConversationState) -> Result<Vec<ToolCallRequest>, TurnError> {
    match state.last() {
        Some(Message::Assistant { tool_calls, .. }) if !tool_calls.is_empty() => {
            Ok(tool_calls.clone())
        }
        _ => Err(TurnError::Internal(
            "resume requested but the last message has no pending tool calls".to_string(),
        )),
    }
}

fn collect_final(
    slots: Vec<Option<Message>>,
    up_to: usize,
) -> Result<Vec<Message>, TurnError> {
    slots
        .into_iter()
        .take(up_to)
        .map(|slot| {
            slot.ok_or_else(|| {
                TurnError::Internal("tool step left an unresolved sibling call".to_string())
            })
        })
        .collect()
}

async fn emit(events: &mpsc::Sender<TurnEvent>, event: TurnEvent) -> Result<(), TurnError> {
    events.send(event).await.map_err(|_| TurnError::StreamClosed)
}
