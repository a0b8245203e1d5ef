use std::sync::Arc;

use concierge_core::{AppConfig, MeetingsConfig};

use crate::metadata::{InterruptSpec, ToolMetadata, ToolMetadataSet};
use crate::retrieval::Retriever;
use crate::tools::ToolRegistry;

pub mod meetings;
pub mod search;

pub use meetings::{
    CreateMeetingTool, GetUserInfoTool, GetUsersCalendarTool, MeetingDefaults, MeetingsApiClient,
};
pub use search::SearchMatchesTool;

/// The standard tool surface: attendee search plus the meetings API suite.
pub fn standard_registry(
    retriever: Arc<dyn Retriever>,
    client: Arc<MeetingsApiClient>,
    config: &AppConfig,
) -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(Arc::new(SearchMatchesTool::new(retriever, config.retrieval.top_k)))
        .with_tool(Arc::new(GetUserInfoTool::new(client.clone())))
        .with_tool(Arc::new(GetUsersCalendarTool::new(client.clone())))
        .with_tool(Arc::new(CreateMeetingTool::new(
            client,
            MeetingDefaults::from(&config.meetings),
        )))
}

/// Metadata matching `standard_registry`. The continue token for meeting
/// approval comes from configuration so deployments can localize it.
pub fn standard_metadata(continue_token: &str) -> ToolMetadataSet {
    ToolMetadataSet::new()
        .with_tool(
            "search_matches",
            ToolMetadata {
                required_args: vec!["query".to_string()],
                return_direct: true,
                interrupt: None,
                display_message: "Searching for relevant people to meet".to_string(),
            },
        )
        .with_tool(
            "get_user_info",
            ToolMetadata {
                required_args: vec![],
                return_direct: false,
                interrupt: None,
                display_message: "Looking up your profile".to_string(),
            },
        )
        .with_tool(
            "get_users_calendar",
            ToolMetadata {
                required_args: vec!["partner_id".to_string()],
                return_direct: false,
                interrupt: None,
                display_message: "Checking calendar availability".to_string(),
            },
        )
        .with_tool(
            "create_meeting",
            ToolMetadata {
                required_args: vec!["partner_id".to_string(), "start_time".to_string()],
                return_direct: true,
                interrupt: Some(InterruptSpec {
                    prompt: "Do you want me to create this meeting?".to_string(),
                    continue_token: continue_token.to_string(),
                }),
                display_message: "Creating a meeting".to_string(),
            },
        )
}

impl From<&MeetingsConfig> for MeetingDefaults {
    fn from(config: &MeetingsConfig) -> Self {
        Self {
            duration_minutes: config.duration_minutes,
            break_time_minutes: config.break_time_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::standard_metadata;

    #[test]
    fn metadata_and_registry_cover_the_same_tool_names() {
        let metadata = standard_metadata("yes");
        assert_eq!(
            metadata.names(),
            vec!["create_meeting", "get_user_info", "get_users_calendar", "search_matches"]
        );
    }

    #[test]
    fn only_meeting_creation_is_gated() {
        let metadata = standard_metadata("confirm");

        let gated = metadata.get("create_meeting").expect("registered");
        let spec = gated.interrupt.as_ref().expect("interruptible");
        assert_eq!(spec.continue_token, "confirm");

        for name in ["search_matches", "get_user_info", "get_users_calendar"] {
            assert!(metadata.get(name).expect("registered").interrupt.is_none());
        }
    }
}
