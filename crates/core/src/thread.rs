use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A reusable tenant-level configuration bundle. Keys in `config` are
/// reserved: user-supplied thread data may never shadow them.
#[derive(Clone, Debug, PartialEq)]
pub struct UserConfig {
    pub id: Uuid,
    pub description: Option<String>,
    pub config: Map<String, Value>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persistent conversation identity. Scopes message history, checkpoints
/// and per-conversation user data.
#[derive(Clone, Debug, PartialEq)]
pub struct Thread {
    pub id: Uuid,
    pub user_config_id: Uuid,
    pub user_data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(user_config_id: Uuid, user_data: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4(), user_config_id, user_data, created_at: now, updated_at: now }
    }
}

/// Drops user-supplied keys that collide with keys configured on the user
/// config, so request data can never shadow operator-managed values.
pub fn filter_reserved_keys(
    user_data: &Map<String, Value>,
    user_config: &UserConfig,
) -> Map<String, Value> {
    user_data
        .iter()
        .filter(|(key, _)| !user_config.config.contains_key(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Builds the `user_data` mapping injected into tool calls. Precedence is
/// fixed: base identifier, then thread-level data, then user-config data;
/// later layers override same-named keys.
pub fn merge_user_data(
    user_config_id: &Uuid,
    thread_data: &Map<String, Value>,
    config_data: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = Map::new();
    merged.insert("user_config_id".to_string(), Value::String(user_config_id.to_string()));
    for (key, value) in thread_data {
        merged.insert(key.clone(), value.clone());
    }
    for (key, value) in config_data {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
