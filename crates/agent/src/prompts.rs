/// Base system prompt. `{tools}` is replaced with the comma-joined list of
/// registered tool names at agent construction.
pub const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are a helpful event concierge assistant. You help attendees find \
relevant people to meet, look up their own profile and calendar, and book \
meetings on their behalf.

You can use the following tools: {tools}.

Use a tool whenever it answers the user's request better than free text. \
Ask for missing details instead of guessing. Never invent attendee data.";

pub fn render_system_prompt(tool_names: &[String]) -> String {
    SYSTEM_PROMPT_TEMPLATE.replace("{tools}", &tool_names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::render_system_prompt;

    #[test]
    fn tool_names_are_substituted() {
        let prompt = render_system_prompt(&[
            "create_meeting".to_string(),
            "search_matches".to_string(),
        ]);

        assert!(prompt.contains("create_meeting, search_matches"));
        assert!(!prompt.contains("{tools}"));
    }
}
