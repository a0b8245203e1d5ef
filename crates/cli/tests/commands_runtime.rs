use std::env;
use std::sync::{Mutex, OnceLock};

use concierge_cli::commands::{migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("CONCIERGE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_on_invalid_database_url() {
    with_env(&[("CONCIERGE_DATABASE_URL", "postgres://elsewhere/db")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_and_verifies_the_demo_dataset() {
    with_env(&[("CONCIERGE_DATABASE_URL", "sqlite::memory:?cache=shared")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("3 document chunks"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(&[("CONCIERGE_DATABASE_URL", "sqlite::memory:?cache=shared")], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["status"], "ok");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["status"], "ok");

        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CONCIERGE_DATABASE_URL",
        "CONCIERGE_DATABASE_MAX_CONNECTIONS",
        "CONCIERGE_DATABASE_TIMEOUT_SECS",
        "CONCIERGE_LLM_PROVIDER",
        "CONCIERGE_LLM_API_KEY",
        "CONCIERGE_LLM_BASE_URL",
        "CONCIERGE_LLM_MODEL",
        "CONCIERGE_LLM_TEMPERATURE",
        "CONCIERGE_LLM_TIMEOUT_SECS",
        "CONCIERGE_LLM_MAX_RETRIES",
        "CONCIERGE_ASSISTANT_NAME",
        "CONCIERGE_ASSISTANT_APPROVAL_CONTINUE_TOKEN",
        "CONCIERGE_RETRIEVAL_TOP_K",
        "CONCIERGE_MEETINGS_API_KEY",
        "CONCIERGE_MEETINGS_DURATION_MINUTES",
        "CONCIERGE_MEETINGS_BREAK_TIME_MINUTES",
        "CONCIERGE_SERVER_BIND_ADDRESS",
        "CONCIERGE_SERVER_PORT",
        "CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CONCIERGE_LOGGING_LEVEL",
        "CONCIERGE_LOGGING_FORMAT",
        "CONCIERGE_LOG_LEVEL",
        "CONCIERGE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
