use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use concierge_db::repositories::DocumentChunkRepository;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("retrieval backend failure: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredChunk {
    pub text: String,
    pub score: f32,
}

/// The opaque retrieval capability: ranked text chunks for a query, scoped
/// by metadata equality filters.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn query(
        &self,
        text: &str,
        filters: &Map<String, Value>,
        top_k: u32,
    ) -> Result<Vec<ScoredChunk>, RetrievalError>;
}

/// Repository-backed retriever ranking by term overlap. Stands in for a
/// production vector engine behind the same trait.
pub struct RepositoryRetriever {
    chunks: Arc<dyn DocumentChunkRepository>,
}

impl RepositoryRetriever {
    pub fn new(chunks: Arc<dyn DocumentChunkRepository>) -> Self {
        Self { chunks }
    }
}

#[async_trait]
impl Retriever for RepositoryRetriever {
    async fn query(
        &self,
        text: &str,
        filters: &Map<String, Value>,
        top_k: u32,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let candidates = self
            .chunks
            .list_matching(filters)
            .await
            .map_err(|e| RetrievalError::Backend(e.to_string()))?;

        let query_terms = terms(text);
        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .map(|chunk| {
                let score = overlap_score(&query_terms, &terms(&chunk.content));
                ScoredChunk { text: chunk.content, score }
            })
            .filter(|chunk| chunk.score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k as usize);
        Ok(scored)
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(str::to_string)
        .collect()
}

fn overlap_score(query: &HashSet<String>, candidate: &HashSet<String>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let shared = query.intersection(candidate).count();
    shared as f32 / query.len() as f32
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map};

    use concierge_db::repositories::{DocumentChunk, DocumentChunkRepository, InMemoryDocumentChunkRepository};

    use super::{RepositoryRetriever, Retriever};

    fn metadata(user_config_id: &str) -> Map<String, serde_json::Value> {
        let mut map = Map::new();
        map.insert("user_config_id".to_string(), json!(user_config_id));
        map
    }

    #[tokio::test]
    async fn ranking_prefers_higher_term_overlap() {
        let repo = Arc::new(InMemoryDocumentChunkRepository::default());
        repo.save(DocumentChunk::new(
            "attendee-profiles",
            "Ada Lovelace, compiler tooling and developer platforms",
            metadata("cfg-1"),
        ))
        .await
        .expect("save");
        repo.save(DocumentChunk::new(
            "attendee-profiles",
            "Grace Hopper, naval logistics",
            metadata("cfg-1"),
        ))
        .await
        .expect("save");

        let retriever = RepositoryRetriever::new(repo);
        let results = retriever
            .query("compiler tooling platforms", &metadata("cfg-1"), 10)
            .await
            .expect("query");

        assert!(!results.is_empty());
        assert!(results[0].text.contains("Ada Lovelace"));
    }

    #[tokio::test]
    async fn filters_scope_the_candidate_set() {
        let repo = Arc::new(InMemoryDocumentChunkRepository::default());
        repo.save(DocumentChunk::new(
            "attendee-profiles",
            "compiler enthusiast from tenant two",
            metadata("cfg-2"),
        ))
        .await
        .expect("save");

        let retriever = RepositoryRetriever::new(repo);
        let results =
            retriever.query("compiler", &metadata("cfg-1"), 10).await.expect("query");

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn top_k_truncates_the_result_list() {
        let repo = Arc::new(InMemoryDocumentChunkRepository::default());
        for index in 0..5 {
            repo.save(DocumentChunk::new(
                "attendee-profiles",
                format!("compiler person number {index}"),
                Map::new(),
            ))
            .await
            .expect("save");
        }

        let retriever = RepositoryRetriever::new(repo);
        let results = retriever.query("compiler", &Map::new(), 2).await.expect("query");

        assert_eq!(results.len(), 2);
    }
}
