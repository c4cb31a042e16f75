//! Dense (vector) search client
//!
//! Embeds the query via the Ollama embeddings endpoint, then runs a
//! nearest-neighbor search against a Qdrant collection of passage
//! embeddings. Cosine similarity lands in `vector_score`.

use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{with_payload_selector::SelectorOptions, SearchPoints, WithPayloadSelector},
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

use crate::errors::{RagError, Result};
use crate::retrieval::backend::SearchBackend;
use crate::types::{Passage, RetrievalResult, Stage};

/// Client for the dense retrieval backend
pub struct VectorIndexClient {
    qdrant: QdrantClient,
    collection: String,
    http: Client,
    embedding_url: String,
    embedding_model: String,
}

impl VectorIndexClient {
    pub fn new(
        vector_url: &str,
        collection: &str,
        embedding_url: &str,
        embedding_model: &str,
        timeout_ms: u64,
    ) -> Result<Self> {
        let qdrant = QdrantClient::from_url(vector_url)
            .build()
            .map_err(|e| RagError::ConfigError(format!("Qdrant client: {}", e)))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| RagError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            qdrant,
            collection: collection.to_string(),
            http,
            embedding_url: embedding_url.trim_end_matches('/').to_string(),
            embedding_model: embedding_model.to_string(),
        })
    }

    /// Embed the query text via Ollama.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.embedding_url);

        let response = self
            .http
            .post(&url)
            .json(&json!({ "model": self.embedding_model, "prompt": text }))
            .send()
            .await
            .map_err(|e| RagError::BackendUnavailable(format!("embedding: {}", e)))?;

        if !response.status().is_success() {
            return Err(RagError::BackendError(format!(
                "embedding: HTTP {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::BackendError(format!("embedding: {}", e)))?;

        if body.embedding.is_empty() {
            return Err(RagError::BackendError(
                "embedding: empty vector returned".to_string(),
            ));
        }

        Ok(body.embedding)
    }
}

#[async_trait]
impl SearchBackend for VectorIndexClient {
    fn name(&self) -> &str {
        "vector"
    }

    async fn search(&self, query: &str, top_n: usize) -> Result<RetrievalResult> {
        let start = Instant::now();
        let embedding = self.embed(query).await?;

        let search_result = self
            .qdrant
            .search_points(&SearchPoints {
                collection_name: self.collection.clone(),
                vector: embedding,
                limit: top_n as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| RagError::BackendUnavailable(format!("vector: {}", e)))?;

        let passages = search_result
            .result
            .into_iter()
            .map(|point| {
                let payload = point.payload;
                let text = |key: &str| {
                    payload
                        .get(key)
                        .and_then(value_as_string)
                        .unwrap_or_default()
                };

                let mut passage = Passage::new(
                    text("chunk_id"),
                    text("text"),
                    text("doc_id"),
                    text("doc_title"),
                );
                passage.section = payload.get("section").and_then(value_as_string);
                passage.page = payload
                    .get("page")
                    .and_then(value_as_integer)
                    .map(|n| n as u32);
                passage.vector_score = Some(point.score);
                passage
            })
            .filter(|p| !p.id.is_empty())
            .collect();

        Ok(RetrievalResult {
            stage: Stage::Vector,
            passages,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> bool {
        self.qdrant.health_check().await.is_ok()
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

// Payload type conversion helpers
fn value_as_string(value: &qdrant_client::qdrant::Value) -> Option<String> {
    value.kind.as_ref().and_then(|kind| {
        use qdrant_client::qdrant::value::Kind;
        match kind {
            Kind::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    })
}

fn value_as_integer(value: &qdrant_client::qdrant::Value) -> Option<i64> {
    value.kind.as_ref().and_then(|kind| {
        use qdrant_client::qdrant::value::Kind;
        match kind {
            Kind::IntegerValue(i) => Some(*i),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_response_parsing() {
        let raw = r#"{"embedding": [0.1, 0.2, 0.3]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.embedding.len(), 3);
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Qdrant and Ollama
    async fn test_search_against_live_backend() {
        let client = VectorIndexClient::new(
            "http://127.0.0.1:6334",
            "documents",
            "http://127.0.0.1:11434",
            "nomic-embed-text",
            3_000,
        )
        .unwrap();
        let result = client.search("budget approval process", 5).await.unwrap();
        assert_eq!(result.stage, Stage::Vector);
    }
}
