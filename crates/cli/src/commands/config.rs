use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use concierge_core::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(
            key_path,
            Some(env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        )
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "CONCIERGE_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "CONCIERGE_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "CONCIERGE_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", "CONCIERGE_LLM_PROVIDER"),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", "CONCIERGE_LLM_MODEL"),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", "CONCIERGE_LLM_BASE_URL"),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", "CONCIERGE_LLM_API_KEY"),
    ));

    lines.push(render_line(
        "assistant.name",
        &config.assistant.name,
        source("assistant.name", "CONCIERGE_ASSISTANT_NAME"),
    ));
    lines.push(render_line(
        "assistant.approval_continue_token",
        &config.assistant.approval_continue_token,
        source(
            "assistant.approval_continue_token",
            "CONCIERGE_ASSISTANT_APPROVAL_CONTINUE_TOKEN",
        ),
    ));

    lines.push(render_line(
        "retrieval.top_k",
        &config.retrieval.top_k.to_string(),
        source("retrieval.top_k", "CONCIERGE_RETRIEVAL_TOP_K"),
    ));

    let meetings_api_key = if config.meetings.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "meetings.api_key",
        meetings_api_key,
        source("meetings.api_key", "CONCIERGE_MEETINGS_API_KEY"),
    ));
    lines.push(render_line(
        "meetings.duration_minutes",
        &config.meetings.duration_minutes.to_string(),
        source("meetings.duration_minutes", "CONCIERGE_MEETINGS_DURATION_MINUTES"),
    ));
    lines.push(render_line(
        "meetings.break_time_minutes",
        &config.meetings.break_time_minutes.to_string(),
        source("meetings.break_time_minutes", "CONCIERGE_MEETINGS_BREAK_TIME_MINUTES"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "CONCIERGE_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "CONCIERGE_SERVER_PORT"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "CONCIERGE_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "CONCIERGE_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("concierge.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/concierge.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
