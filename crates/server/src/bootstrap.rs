use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use concierge_agent::{
    build_chat_model, standard_metadata, standard_registry, CheckpointStore, ConversationGraph,
    MeetingsApiClient, ModelError, RepositoryRetriever, TurnRunner,
};
use concierge_core::{AppConfig, ConfigError, LoadOptions};
use concierge_db::repositories::{
    SqlCheckpointRepository, SqlDocumentChunkRepository, SqlThreadRepository,
    SqlUserConfigRepository,
};
use concierge_db::{connect_with_settings, migrations, DbPool};

use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("toolkit construction failed: {0}")]
    Toolkit(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Builds the full runtime from an already-loaded config: database pool,
/// migrations, chat model, tool surface and the turn runner behind the
/// assistant routes. Any failure here aborts startup.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let model = build_chat_model(&config.llm)?;
    let retriever =
        Arc::new(RepositoryRetriever::new(Arc::new(SqlDocumentChunkRepository::new(
            db_pool.clone(),
        ))));
    let meetings_client = Arc::new(
        MeetingsApiClient::new(&config.meetings)
            .map_err(|error| BootstrapError::Toolkit(error.to_string()))?,
    );
    let registry = standard_registry(retriever, meetings_client, &config);
    let metadata = Arc::new(standard_metadata(&config.assistant.approval_continue_token));

    let graph =
        ConversationGraph::new(model, registry, metadata.clone(), config.assistant.name.as_str());
    let checkpoints =
        CheckpointStore::new(Arc::new(SqlCheckpointRepository::new(db_pool.clone())));
    let runner = Arc::new(TurnRunner::new(graph, checkpoints, metadata));
    info!(
        event_name = "system.bootstrap.runtime_ready",
        model = %config.llm.model,
        "agent runtime constructed"
    );

    let state = AppState {
        runner,
        user_configs: Arc::new(SqlUserConfigRepository::new(db_pool.clone())),
        threads: Arc::new(SqlThreadRepository::new(db_pool.clone())),
    };

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use concierge_core::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_database_url() {
        let result = bootstrap(options("postgres://elsewhere/db")).await;

        assert!(result.is_err());
        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_prepares_the_conversation_store() {
        let app = bootstrap(options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with default local-model config");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('user_configs', 'threads', 'checkpoints', 'document_chunks')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables should exist after bootstrap");
        assert_eq!(table_count, 4);

        app.db_pool.close().await;
    }
}
