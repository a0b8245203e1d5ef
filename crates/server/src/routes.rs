use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use concierge_agent::TurnRunner;
use concierge_core::{
    filter_reserved_keys, merge_user_data, ApplicationError, InterfaceError, Thread,
};
use concierge_db::repositories::{RepositoryError, ThreadRepository, UserConfigRepository};

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<TurnRunner>,
    pub user_configs: Arc<dyn UserConfigRepository>,
    pub threads: Arc<dyn ThreadRepository>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let application = match self {
            ApiError::NotFound(resource) => ApplicationError::NotFound(resource.to_string()),
            ApiError::Repository(error) => ApplicationError::Persistence(error.to_string()),
        };
        let correlation_id = Uuid::new_v4().to_string();
        let interface = application.into_interface(correlation_id.clone());
        let status = match &interface {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(
            event_name = "server.api.error",
            correlation_id = %correlation_id,
            error = %interface,
        );
        (
            status,
            Json(json!({
                "error": interface.user_message(),
                "correlation_id": correlation_id,
            })),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/assistant/init", post(init))
        .route("/api/v1/assistant/chat", post(chat))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub user_config_id: Uuid,
    #[serde(default)]
    pub user_data: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub thread_id: Uuid,
}

/// Creates a conversation thread under a user config. Caller-supplied user
/// data is kept, except keys that would shadow configured values.
pub async fn init(
    State(state): State<AppState>,
    Json(request): Json<InitRequest>,
) -> Result<(StatusCode, Json<InitResponse>), ApiError> {
    let user_config = state
        .user_configs
        .find_by_id(&request.user_config_id)
        .await?
        .filter(|config| config.active)
        .ok_or(ApiError::NotFound("user config"))?;

    let user_data = filter_reserved_keys(&request.user_data, &user_config);
    let thread = Thread::new(user_config.id, user_data);
    let thread_id = thread.id;
    state.threads.save(thread).await?;

    tracing::info!(
        event_name = "server.assistant.thread_created",
        thread_id = %thread_id,
        user_config_id = %user_config.id,
    );
    Ok((StatusCode::CREATED, Json(InitResponse { thread_id })))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub thread_id: Uuid,
    pub message: String,
}

/// Drives one turn and streams its events as newline-delimited JSON. The
/// body stays open until the turn completes, suspends or fails; fatal
/// failures arrive as a final error object rather than a broken connection.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let thread = state
        .threads
        .find_by_id(&request.thread_id)
        .await?
        .ok_or(ApiError::NotFound("thread"))?;
    let user_config = state
        .user_configs
        .find_by_id(&thread.user_config_id)
        .await?
        .ok_or(ApiError::NotFound("user config"))?;

    let user_data = merge_user_data(&thread.user_config_id, &thread.user_data, &user_config.config);

    let (events_tx, events_rx) = mpsc::channel(32);
    let runner = state.runner.clone();
    tokio::spawn(async move {
        if let Err(error) = runner.run(thread.id, &request.message, &user_data, events_tx).await {
            tracing::error!(
                event_name = "server.assistant.turn_failed",
                thread_id = %thread.id,
                error = %error,
            );
        }
    });

    let body = Body::from_stream(
        ReceiverStream::new(events_rx)
            .map(|event| Ok::<_, Infallible>(format!("{}\n", event.to_wire()))),
    );
    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::Json;
    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    use concierge_agent::{
        AssistantTurn, ChatModel, CheckpointStore, ConversationGraph, ModelError,
        ToolMetadataSet, ToolRegistry, ToolSchema, TurnRunner,
    };
    use concierge_core::{Message, UserConfig};
    use concierge_db::repositories::{
        InMemoryCheckpointRepository, InMemoryThreadRepository, InMemoryUserConfigRepository,
        ThreadRepository, UserConfigRepository,
    };

    use super::{chat, init, AppState, ChatRequest, InitRequest};

    struct CannedModel {
        reply: String,
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn invoke(
            &self,
            _system_prompt: &str,
            _tools: &[ToolSchema],
            _history: &[Message],
        ) -> Result<AssistantTurn, ModelError> {
            Ok(AssistantTurn { text: self.reply.clone(), tool_calls: Vec::new() })
        }
    }

    fn state_with_reply(reply: &str) -> AppState {
        let metadata = Arc::new(ToolMetadataSet::new());
        let graph = ConversationGraph::new(
            Arc::new(CannedModel { reply: reply.to_string() }),
            ToolRegistry::new(),
            metadata.clone(),
            "concierge",
        );
        let checkpoints = CheckpointStore::new(Arc::new(InMemoryCheckpointRepository::default()));
        AppState {
            runner: Arc::new(TurnRunner::new(graph, checkpoints, metadata)),
            user_configs: Arc::new(InMemoryUserConfigRepository::default()),
            threads: Arc::new(InMemoryThreadRepository::default()),
        }
    }

    async fn seeded_config(state: &AppState, config: Map<String, Value>) -> UserConfig {
        let now = chrono::Utc::now();
        let user_config = UserConfig {
            id: Uuid::new_v4(),
            description: Some("demo tenant".to_string()),
            config,
            active: true,
            created_at: now,
            updated_at: now,
        };
        state.user_configs.save(user_config.clone()).await.expect("save config");
        user_config
    }

    #[tokio::test]
    async fn init_creates_a_thread_under_the_config() {
        let state = state_with_reply("hello");
        let user_config = seeded_config(&state, Map::new()).await;

        let (status, Json(response)) = init(
            State(state.clone()),
            Json(InitRequest { user_config_id: user_config.id, user_data: Map::new() }),
        )
        .await
        .expect("init");

        assert_eq!(status, StatusCode::CREATED);
        let thread = state
            .threads
            .find_by_id(&response.thread_id)
            .await
            .expect("lookup")
            .expect("thread stored");
        assert_eq!(thread.user_config_id, user_config.id);
    }

    #[tokio::test]
    async fn init_rejects_an_unknown_user_config() {
        let state = state_with_reply("hello");

        let result = init(
            State(state),
            Json(InitRequest { user_config_id: Uuid::new_v4(), user_data: Map::new() }),
        )
        .await;

        assert!(matches!(result, Err(super::ApiError::NotFound("user config"))));
    }

    #[tokio::test]
    async fn init_drops_user_data_keys_shadowing_the_config() {
        let state = state_with_reply("hello");
        let mut config = Map::new();
        config.insert("api_url".to_string(), json!("https://configured.example"));
        let user_config = seeded_config(&state, config).await;

        let mut user_data = Map::new();
        user_data.insert("api_url".to_string(), json!("https://spoofed.example"));
        user_data.insert("user_id".to_string(), json!(7));

        let (_, Json(response)) = init(
            State(state.clone()),
            Json(InitRequest { user_config_id: user_config.id, user_data }),
        )
        .await
        .expect("init");

        let thread = state
            .threads
            .find_by_id(&response.thread_id)
            .await
            .expect("lookup")
            .expect("thread stored");
        assert!(!thread.user_data.contains_key("api_url"));
        assert_eq!(thread.user_data.get("user_id"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn chat_streams_events_as_json_lines() {
        let state = state_with_reply("Hi there!");
        let user_config = seeded_config(&state, Map::new()).await;
        let (_, Json(created)) = init(
            State(state.clone()),
            Json(InitRequest { user_config_id: user_config.id, user_data: Map::new() }),
        )
        .await
        .expect("init");

        let response = chat(
            State(state),
            Json(ChatRequest { thread_id: created.thread_id, message: "hello".to_string() }),
        )
        .await
        .expect("chat");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .expect("streamed body");
        let lines: Vec<Value> = String::from_utf8_lossy(&bytes)
            .lines()
            .map(|line| serde_json::from_str(line).expect("each line is JSON"))
            .collect();

        assert_eq!(lines, vec![json!({"text": "Hi there!"})]);
    }

    #[tokio::test]
    async fn api_errors_render_user_safe_payloads() {
        use axum::response::IntoResponse;

        let response = super::ApiError::NotFound("thread").into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.expect("body");
        let payload: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["error"], "The requested resource does not exist.");
        assert!(payload["correlation_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn chat_rejects_an_unknown_thread() {
        let state = state_with_reply("hello");

        let result = chat(
            State(state),
            Json(ChatRequest { thread_id: Uuid::new_v4(), message: "hello".to_string() }),
        )
        .await;

        assert!(matches!(result, Err(super::ApiError::NotFound("thread"))));
    }
}
