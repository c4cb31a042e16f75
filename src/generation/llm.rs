//! LLM-backed grounded generation via Ollama
//!
//! Builds a structured prompt instructing the model to answer strictly
//! from the supplied passages, cite every claim with
//! `[source: doc_id, page N]` markers, and reply with the fixed refusal
//! phrase when the context does not support an answer. Non-streaming
//! POST /api/generate; output length capped via num_predict.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::errors::{RagError, Result};
use crate::generation::{
    parse_citation_markers, resolve_citations, GeneratedAnswer, Generator,
    INSUFFICIENT_DATA_ANSWER,
};
use crate::types::Context;

/// Grounded generation client for Ollama
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    config: GenerationConfig,
}

impl OllamaGenerator {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Render context passages as citation-headed blocks.
    fn format_context(context: &Context) -> String {
        let mut blocks = Vec::with_capacity(context.passages.len());

        for passage in &context.passages {
            let mut header = format!("[Document: {}", passage.title);
            if let Some(page) = passage.page {
                header.push_str(&format!(", Page {}", page));
            }
            if let Some(section) = &passage.section {
                header.push_str(&format!(", Section: {}", section));
            }
            header.push_str(&format!(", Source: {}]", passage.source_document_id));

            blocks.push(format!("{}\n{}", header, passage.text.trim()));
        }

        blocks.join("\n\n")
    }

    fn build_prompt(&self, question: &str, context: &Context) -> String {
        format!(
            "Context from documents:\n{context}\n\n\
             User question: {question}\n\n\
             Instructions:\n\
             - Answer only from the context above\n\
             - Cite every claim as [source: doc_id, page N]\n\
             - If the context is insufficient, reply exactly: \"{refusal}\"\n\
             - Be brief and precise\n\n\
             Answer:",
            context = Self::format_context(context),
            question = question,
            refusal = INSUFFICIENT_DATA_ANSWER,
        )
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, question: &str, context: &Context) -> Result<GeneratedAnswer> {
        let url = format!(
            "{}/api/generate",
            self.config.base_url.trim_end_matches('/')
        );

        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: self.build_prompt(question, context),
            stream: false,
            options: json!({
                "temperature": self.config.temperature,
                "top_p": self.config.top_p,
                "num_predict": self.config.max_output_tokens,
            }),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::LlmFailed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RagError::LlmFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RagError::LlmFailed(format!("malformed response: {}", e)))?;

        let text = body.response.trim().to_string();
        if text.is_empty() {
            return Err(RagError::LlmFailed("empty response".to_string()));
        }

        let markers = parse_citation_markers(&text);
        let resolved = resolve_citations(&markers, context);

        Ok(GeneratedAnswer {
            text,
            cited_passage_ids: resolved.passage_ids,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Passage;

    fn sample_context() -> Context {
        let mut passage = Passage::new(
            "p1",
            "The budget approval process has three steps.",
            "doc1",
            "Financial Policy",
        );
        passage.page = Some(4);
        Context {
            passages: vec![passage],
            total_tokens: 11,
        }
    }

    #[test]
    fn test_prompt_contains_context_and_instructions() {
        let generator = OllamaGenerator::new(GenerationConfig::default()).unwrap();
        let prompt = generator.build_prompt("What is the budget approval process?", &sample_context());

        assert!(prompt.contains("three steps"));
        assert!(prompt.contains("[Document: Financial Policy, Page 4, Source: doc1]"));
        assert!(prompt.contains("What is the budget approval process?"));
        assert!(prompt.contains(INSUFFICIENT_DATA_ANSWER));
    }

    #[test]
    fn test_context_formatting_without_page() {
        let context = Context {
            passages: vec![Passage::new("p1", "Some text.", "doc2", "Handbook")],
            total_tokens: 2,
        };
        let formatted = OllamaGenerator::format_context(&context);
        assert_eq!(formatted, "[Document: Handbook, Source: doc2]\nSome text.");
    }

    #[test]
    fn test_generate_response_parsing() {
        let raw = r#"{"response": "Three steps. [source: doc1, page 4]"}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.response.contains("Three steps"));
    }
}
