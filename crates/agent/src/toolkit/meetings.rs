use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};

use concierge_core::MeetingsConfig;

use crate::tools::{Tool, ToolError};

/// Configuration-level defaults for meeting creation. User data may
/// override both per thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeetingDefaults {
    pub duration_minutes: u32,
    pub break_time_minutes: u32,
}

/// Thin client for the external meetings/matchmaking API. Authenticates
/// with an `X-API-Key` header and unwraps the `{"data": ...}` response
/// envelope; endpoints that reply with a non-JSON body count as an empty
/// object.
pub struct MeetingsApiClient {
    http: reqwest::Client,
    api_key: Option<SecretString>,
}

impl MeetingsApiClient {
    pub fn new(config: &MeetingsConfig) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ToolError::Upstream(e.to_string()))?;
        Ok(Self { http, api_key: config.api_key.clone() })
    }

    pub async fn get(&self, base_url: &str, path: &str) -> Result<Value, ToolError> {
        let request = self.http.get(join_url(base_url, path));
        self.send(request).await
    }

    pub async fn post(&self, base_url: &str, path: &str, body: &Value) -> Result<Value, ToolError> {
        let request = self.http.post(join_url(base_url, path)).json(body);
        self.send(request).await
    }

    async fn send(&self, mut request: reqwest::RequestBuilder) -> Result<Value, ToolError> {
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key.expose_secret());
        }

        let response = request.send().await.map_err(|e| ToolError::Upstream(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ToolError::Upstream(format!("meetings API status {status}: {detail}")));
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(_) => Value::Object(Map::new()),
        };
        Ok(unwrap_envelope(body))
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn user_data(args: &Map<String, Value>) -> Map<String, Value> {
    match args.get("user_data") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

fn require_api_url(user_data: &Map<String, Value>) -> Result<String, ToolError> {
    user_data
        .get("api_url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::BadArgument("user_data.api_url".to_string()))
}

fn require_user_id(user_data: &Map<String, Value>) -> Result<Value, ToolError> {
    user_data
        .get("user_id")
        .cloned()
        .ok_or_else(|| ToolError::BadArgument("user_data.user_id".to_string()))
}

/// Looks up the active user's own profile on the meetings platform.
pub struct GetUserInfoTool {
    client: Arc<MeetingsApiClient>,
}

impl GetUserInfoTool {
    pub fn new(client: Arc<MeetingsApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetUserInfoTool {
    fn name(&self) -> &str {
        "get_user_info"
    }

    fn description(&self) -> &str {
        "Fetch the current user's profile from the meetings platform."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let data = user_data(args);
        let api_url = require_api_url(&data)?;
        let user_id = require_user_id(&data)?;

        self.client.get(&api_url, &format!("users/{user_id}")).await
    }
}

/// Availability lookup covering both the user and the prospective partner.
pub struct GetUsersCalendarTool {
    client: Arc<MeetingsApiClient>,
}

impl GetUsersCalendarTool {
    pub fn new(client: Arc<MeetingsApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetUsersCalendarTool {
    fn name(&self) -> &str {
        "get_users_calendar"
    }

    fn description(&self) -> &str {
        "Fetch open calendar slots shared by the current user and a partner."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "partner_id": {
                    "type": "integer",
                    "description": "Identifier of the other attendee."
                }
            },
            "required": ["partner_id"]
        })
    }

    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let partner_id =
            args.get("partner_id").ok_or_else(|| ToolError::BadArgument("partner_id".to_string()))?;
        let data = user_data(args);
        let api_url = require_api_url(&data)?;
        let user_id = require_user_id(&data)?;

        self.client
            .get(&api_url, &format!("users/{user_id}/calendar?partner_id={partner_id}"))
            .await
    }
}

/// Books a meeting between the user and a partner. Duration and break time
/// fall back to configured defaults when the thread supplies neither.
pub struct CreateMeetingTool {
    client: Arc<MeetingsApiClient>,
    defaults: MeetingDefaults,
}

impl CreateMeetingTool {
    pub fn new(client: Arc<MeetingsApiClient>, defaults: MeetingDefaults) -> Self {
        Self { client, defaults }
    }

    fn resolve_u32(&self, data: &Map<String, Value>, key: &str, fallback: u32) -> u32 {
        data.get(key).and_then(Value::as_u64).map(|value| value as u32).unwrap_or(fallback)
    }
}

#[async_trait]
impl Tool for CreateMeetingTool {
    fn name(&self) -> &str {
        "create_meeting"
    }

    fn description(&self) -> &str {
        "Book a meeting with another attendee at an agreed time."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "partner_id": {
                    "type": "integer",
                    "description": "Identifier of the other attendee."
                },
                "start_time": {
                    "type": "string",
                    "description": "Meeting start in RFC3339 format."
                }
            },
            "required": ["partner_id", "start_time"]
        })
    }

    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let partner_id =
            args.get("partner_id").ok_or_else(|| ToolError::BadArgument("partner_id".to_string()))?;
        let start_time = args
            .get("start_time")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::BadArgument("start_time".to_string()))?;

        let data = user_data(args);
        let api_url = require_api_url(&data)?;
        let user_id = require_user_id(&data)?;

        let duration = self.resolve_u32(&data, "duration", self.defaults.duration_minutes);
        let break_time = self.resolve_u32(&data, "break_time", self.defaults.break_time_minutes);

        let body = json!({
            "user_id": user_id,
            "partner_id": partner_id,
            "start_time": start_time,
            "duration": duration,
            "break_time": break_time,
        });
        self.client.post(&api_url, "meetings", &body).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{unwrap_envelope, MeetingDefaults};

    #[test]
    fn envelope_data_is_unwrapped() {
        let body = json!({"data": {"id": 7, "name": "Ada"}});
        assert_eq!(unwrap_envelope(body), json!({"id": 7, "name": "Ada"}));
    }

    #[test]
    fn bodies_without_an_envelope_pass_through() {
        let body = json!([1, 2, 3]);
        assert_eq!(unwrap_envelope(body.clone()), body);

        assert_eq!(unwrap_envelope(Value::Object(Map::new())), json!({}));
    }

    #[test]
    fn duration_defaults_resolve_from_config_then_user_data() {
        let defaults = MeetingDefaults { duration_minutes: 30, break_time_minutes: 10 };

        let client = std::sync::Arc::new(
            super::MeetingsApiClient::new(&concierge_core::MeetingsConfig {
                api_key: None,
                duration_minutes: 30,
                break_time_minutes: 10,
            })
            .expect("client"),
        );
        let tool = super::CreateMeetingTool::new(client, defaults);

        let empty = Map::new();
        assert_eq!(tool.resolve_u32(&empty, "duration", defaults.duration_minutes), 30);

        let mut overridden = Map::new();
        overridden.insert("duration".to_string(), json!(45));
        assert_eq!(tool.resolve_u32(&overridden, "duration", defaults.duration_minutes), 45);
    }
}
