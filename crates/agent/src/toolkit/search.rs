use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::retrieval::Retriever;
use crate::tools::{Tool, ToolError};

/// Retrieval-backed attendee matching. Scoped to the tenant identified by
/// `user_config_id` in the injected user data; a missing identifier is an
/// error rather than an unscoped search.
pub struct SearchMatchesTool {
    retriever: Arc<dyn Retriever>,
    top_k: u32,
}

impl SearchMatchesTool {
    pub fn new(retriever: Arc<dyn Retriever>, top_k: u32) -> Self {
        Self { retriever, top_k }
    }
}

#[async_trait]
impl Tool for SearchMatchesTool {
    fn name(&self) -> &str {
        "search_matches"
    }

    fn description(&self) -> &str {
        "Find event attendees and companies relevant to a free-text interest query."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What the user is looking for, e.g. an industry or role."
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::BadArgument("query".to_string()))?;

        let user_config_id = args
            .get("user_data")
            .and_then(|data| data.get("user_config_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::BadArgument("user_data.user_config_id".to_string()))?;

        let mut filters = Map::new();
        filters.insert("user_config_id".to_string(), Value::String(user_config_id.to_string()));

        let chunks = self
            .retriever
            .query(query, &filters, self.top_k)
            .await
            .map_err(|e| ToolError::Upstream(e.to_string()))?;

        let matches: Vec<Value> = chunks
            .into_iter()
            .map(|chunk| json!({"text": chunk.text, "score": chunk.score}))
            .collect();
        Ok(json!({ "matches": matches }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map, Value};

    use concierge_db::repositories::{DocumentChunk, DocumentChunkRepository, InMemoryDocumentChunkRepository};

    use super::SearchMatchesTool;
    use crate::retrieval::RepositoryRetriever;
    use crate::tools::{Tool, ToolError};

    async fn tool_with_chunk(owner: &str) -> SearchMatchesTool {
        let repo = Arc::new(InMemoryDocumentChunkRepository::default());
        let mut metadata = Map::new();
        metadata.insert("user_config_id".to_string(), json!(owner));
        repo.save(DocumentChunk::new(
            "attendee-profiles",
            "Ada Lovelace, compiler tooling",
            metadata,
        ))
        .await
        .expect("save chunk");
        SearchMatchesTool::new(Arc::new(RepositoryRetriever::new(repo)), 10)
    }

    fn args(query: &str, user_config_id: Option<&str>) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("query".to_string(), json!(query));
        if let Some(id) = user_config_id {
            map.insert("user_data".to_string(), json!({"user_config_id": id}));
        }
        map
    }

    #[tokio::test]
    async fn scoped_search_returns_matches() {
        let tool = tool_with_chunk("cfg-1").await;

        let result = tool.call(&args("compiler tooling", Some("cfg-1"))).await.expect("call");

        assert_eq!(result["matches"].as_array().map(Vec::len), Some(1));
        assert!(result["matches"][0]["text"].as_str().unwrap_or_default().contains("Ada"));
    }

    #[tokio::test]
    async fn missing_tenant_identifier_is_an_error() {
        let tool = tool_with_chunk("cfg-1").await;

        let result = tool.call(&args("compiler tooling", None)).await;

        assert!(matches!(
            result,
            Err(ToolError::BadArgument(ref name)) if name == "user_data.user_config_id"
        ));
    }

    #[tokio::test]
    async fn other_tenants_chunks_are_invisible() {
        let tool = tool_with_chunk("cfg-2").await;

        let result = tool.call(&args("compiler tooling", Some("cfg-1"))).await.expect("call");

        assert_eq!(result["matches"].as_array().map(Vec::len), Some(0));
    }
}
