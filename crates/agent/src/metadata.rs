use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Human-approval handshake configuration for one tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterruptSpec {
    /// Prompt shown to the user when the turn suspends.
    pub prompt: String,
    /// Trimmed user input that counts as approval. Anything else denies.
    pub continue_token: String,
}

/// Static per-tool descriptor. Loaded once at agent construction and never
/// mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    #[serde(default)]
    pub required_args: Vec<String>,
    #[serde(default)]
    pub return_direct: bool,
    #[serde(default)]
    pub interrupt: Option<InterruptSpec>,
    /// Short progress line surfaced in tool-call notices.
    pub display_message: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("no metadata registered for tool `{0}`")]
    UnknownTool(String),
}

/// Metadata keyed by tool name. A missing entry is a configuration error,
/// never a conversational one.
#[derive(Clone, Debug, Default)]
pub struct ToolMetadataSet {
    entries: BTreeMap<String, ToolMetadata>,
}

impl ToolMetadataSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: impl Into<String>, metadata: ToolMetadata) -> Self {
        self.entries.insert(name.into(), metadata);
        self
    }

    pub fn get(&self, name: &str) -> Result<&ToolMetadata, MetadataError> {
        self.entries.get(name).ok_or_else(|| MetadataError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Tool names in deterministic (lexicographic) order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{MetadataError, ToolMetadata, ToolMetadataSet};

    fn plain(display: &str) -> ToolMetadata {
        ToolMetadata {
            required_args: Vec::new(),
            return_direct: false,
            interrupt: None,
            display_message: display.to_string(),
        }
    }

    #[test]
    fn lookup_of_unregistered_tool_is_a_configuration_error() {
        let set = ToolMetadataSet::new().with_tool("lookup", plain("Looking things up"));

        assert!(set.get("lookup").is_ok());
        assert_eq!(
            set.get("missing").unwrap_err(),
            MetadataError::UnknownTool("missing".to_string())
        );
    }

    #[test]
    fn names_are_deterministically_ordered() {
        let set = ToolMetadataSet::new()
            .with_tool("zeta", plain("z"))
            .with_tool("alpha", plain("a"))
            .with_tool("mid", plain("m"));

        assert_eq!(set.names(), vec!["alpha", "mid", "zeta"]);
    }
}
