use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use concierge_core::{LlmConfig, LlmProvider, Message, ToolCallRequest};

use crate::tools::ToolSchema;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model transport failure: {0}")]
    Transport(String),
    #[error("model returned an unusable response: {0}")]
    Decode(String),
    #[error("model configuration invalid: {0}")]
    Configuration(String),
}

/// What one model invocation produced: reply text plus any tool requests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssistantTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// The opaque chat-completion capability. Given a prompt, the advertised
/// tool schemas and the message history, produce the next assistant turn.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        history: &[Message],
    ) -> Result<AssistantTurn, ModelError>;
}

/// Selects the concrete model implementation once at startup. Both variants
/// speak the chat-completions wire format; `Local` targets a llama-style
/// server and needs no API key.
pub fn build_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>, ModelError> {
    let base_url = match (config.provider, config.base_url.as_deref()) {
        (_, Some(url)) => url.trim_end_matches('/').to_string(),
        (LlmProvider::OpenAiCompatible, None) => "https://api.openai.com/v1".to_string(),
        (LlmProvider::Local, None) => {
            return Err(ModelError::Configuration(
                "local provider requires llm.base_url".to_string(),
            ))
        }
    };

    let api_key = config.api_key.as_ref().map(|key| key.expose_secret().to_string());

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| ModelError::Configuration(e.to_string()))?;

    Ok(Arc::new(OpenAiCompatibleModel {
        http,
        base_url,
        api_key,
        model: config.model.clone(),
        temperature: config.temperature,
        max_retries: config.max_retries,
    }))
}

/// Chat-completions client used for both hosted and local providers.
pub struct OpenAiCompatibleModel {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_retries: u32,
}

#[async_trait]
impl ChatModel for OpenAiCompatibleModel {
    async fn invoke(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        history: &[Message],
    ) -> Result<AssistantTurn, ModelError> {
        let body = self.request_body(system_prompt, tools, history);

        let mut last_error = ModelError::Transport("no attempt made".to_string());
        for attempt in 0..=self.max_retries {
            match self.send_once(&body).await {
                Ok(turn) => return Ok(turn),
                Err(error @ ModelError::Decode(_)) => return Err(error),
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.model.retry",
                        attempt,
                        error = %error,
                    );
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }
}

impl OpenAiCompatibleModel {
    fn request_body(
        &self,
        system_prompt: &str,
        tools: &[ToolSchema],
        history: &[Message],
    ) -> Value {
        let mut messages = vec![json!({"role": "system", "content": system_prompt})];
        messages.extend(history.iter().map(wire_message));

        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });
        if !tools.is_empty() {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|schema| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": schema.name,
                            "description": schema.description,
                            "parameters": schema.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tool_defs);
        }
        body
    }

    async fn send_once(&self, body: &Value) -> Result<AssistantTurn, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response =
            request.send().await.map_err(|e| ModelError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ModelError::Transport(format!("status {status}: {detail}")));
        }

        let completion: WireCompletion =
            response.json().await.map_err(|e| ModelError::Decode(e.to_string()))?;
        decode_completion(completion)
    }
}

fn wire_message(message: &Message) -> Value {
    match message {
        Message::User { text } => json!({"role": "user", "content": text}),
        Message::Assistant { text, tool_calls, .. } => {
            let mut wire = json!({"role": "assistant", "content": text});
            if !tool_calls.is_empty() {
                let calls: Vec<Value> = tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(call.args.clone()).to_string(),
                            }
                        })
                    })
                    .collect();
                wire["tool_calls"] = Value::Array(calls);
            }
            wire
        }
        Message::ToolResult { tool_call_id, content, .. } => {
            json!({"role": "tool", "tool_call_id": tool_call_id, "content": content})
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCompletion {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

fn decode_completion(completion: WireCompletion) -> Result<AssistantTurn, ModelError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Decode("completion had no choices".to_string()))?;

    let mut tool_calls = Vec::with_capacity(choice.message.tool_calls.len());
    for call in choice.message.tool_calls {
        let args: Map<String, Value> = if call.function.arguments.trim().is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&call.function.arguments).map_err(|e| {
                ModelError::Decode(format!(
                    "tool call `{}` carried unparseable arguments: {e}",
                    call.function.name
                ))
            })?
        };
        tool_calls.push(ToolCallRequest::new(call.id, call.function.name, args));
    }

    Ok(AssistantTurn { text: choice.message.content.unwrap_or_default(), tool_calls })
}

#[cfg(test)]
pub(crate) mod doubles {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use concierge_core::Message;

    use super::{AssistantTurn, ChatModel, ModelError};
    use crate::tools::ToolSchema;

    /// Deterministic model double: replays queued turns in order.
    pub struct ScriptedModel {
        turns: Mutex<Vec<AssistantTurn>>,
    }

    impl ScriptedModel {
        pub fn new(turns: Vec<AssistantTurn>) -> Self {
            Self { turns: Mutex::new(turns) }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn invoke(
            &self,
            _system_prompt: &str,
            _tools: &[ToolSchema],
            _history: &[Message],
        ) -> Result<AssistantTurn, ModelError> {
            let mut turns = self.turns.lock().await;
            if turns.is_empty() {
                return Err(ModelError::Transport("scripted model exhausted".to_string()));
            }
            Ok(turns.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{decode_completion, wire_message, WireCompletion};
    use concierge_core::{Message, ToolCallRequest};

    #[test]
    fn tool_call_arguments_decode_from_json_string() {
        let completion: WireCompletion = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "create_meeting", "arguments": "{\"partner_id\": 7}"}
                    }]
                }
            }]
        }))
        .expect("decode wire completion");

        let turn = decode_completion(completion).expect("decode turn");
        assert_eq!(turn.text, "");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "create_meeting");
        assert_eq!(turn.tool_calls[0].args["partner_id"], json!(7));
    }

    #[test]
    fn unparseable_tool_arguments_are_a_decode_error() {
        let completion: WireCompletion = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "c1",
                        "function": {"name": "create_meeting", "arguments": "not json"}
                    }]
                }
            }]
        }))
        .expect("decode wire completion");

        assert!(decode_completion(completion).is_err());
    }

    #[test]
    fn history_maps_to_wire_roles() {
        let mut args = serde_json::Map::new();
        args.insert("q".to_string(), json!("compilers"));

        let user = wire_message(&Message::user("hello"));
        assert_eq!(user["role"], "user");

        let assistant = wire_message(&Message::assistant_with_tool_calls(
            "",
            vec![ToolCallRequest::new("c1", "search_matches", args)],
        ));
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "search_matches");

        let tool = wire_message(&Message::tool_success("c1", "search_matches", "{}"));
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "c1");
    }
}
