//! Lexical (BM25) search client
//!
//! Queries an Elasticsearch-compatible backend with a multi_match over
//! passage text, title, and section. Raw BM25 scores land in
//! `lexical_score`; they are never compared against vector scores
//! directly, fusion works on ranks.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

use crate::errors::{RagError, Result};
use crate::retrieval::backend::SearchBackend;
use crate::types::{Passage, RetrievalResult, Stage};

/// Client for the BM25 search backend
#[derive(Debug, Clone)]
pub struct LexicalIndexClient {
    client: Client,
    base_url: String,
    index: String,
}

impl LexicalIndexClient {
    pub fn new(base_url: &str, index: &str, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| RagError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    fn search_body(query: &str, top_n: usize) -> serde_json::Value {
        json!({
            "query": {
                "multi_match": {
                    "query": query,
                    "fields": ["text^2", "doc_title^1.5", "section"],
                    "type": "best_fields",
                    "operator": "or"
                }
            },
            "size": top_n,
            "_source": ["chunk_id", "doc_id", "text", "doc_title", "section", "page"]
        })
    }
}

#[async_trait]
impl SearchBackend for LexicalIndexClient {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn search(&self, query: &str, top_n: usize) -> Result<RetrievalResult> {
        let start = Instant::now();
        let url = format!("{}/{}/_search", self.base_url, self.index);

        let response = self
            .client
            .post(&url)
            .json(&Self::search_body(query, top_n))
            .send()
            .await
            .map_err(|e| RagError::BackendUnavailable(format!("lexical: {}", e)))?;

        if !response.status().is_success() {
            return Err(RagError::BackendError(format!(
                "lexical: HTTP {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| RagError::BackendError(format!("lexical: {}", e)))?;

        let passages = body
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let src = hit.source;
                let mut passage =
                    Passage::new(src.chunk_id, src.text, src.doc_id, src.doc_title);
                passage.section = src.section;
                passage.page = src.page;
                passage.lexical_score = Some(hit.score);
                passage
            })
            .collect();

        Ok(RetrievalResult {
            stage: Stage::Lexical,
            passages,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/_cluster/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_score")]
    score: f32,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    chunk_id: String,
    doc_id: String,
    text: String,
    doc_title: String,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    page: Option<u32>,
}
