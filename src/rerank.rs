//! Cross-encoder reranking of fused candidates
//!
//! The fused pool is capped, then each (question, passage) pair is
//! scored by a [`RelevanceScorer`]. Output ordering is a total order so
//! repeated calls over the same candidate set are identical: rerank
//! score descending, ties by fused rank, then passage id ascending.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RerankConfig;
use crate::errors::{RagError, Result};
use crate::types::{Passage, RetrievalResult, Stage};

/// Pairwise relevance scorer contract.
///
/// Returns one score per passage, in input order.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, question: &str, passages: &[Passage]) -> Result<Vec<f32>>;
}

/// HTTP client for a cross-encoder scoring service.
///
/// Expects `POST {endpoint}` with `{query, texts}` and a `{scores}`
/// response, one score per text.
#[derive(Debug, Clone)]
pub struct CrossEncoderClient {
    client: Client,
    endpoint: String,
}

impl CrossEncoderClient {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| RagError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl RelevanceScorer for CrossEncoderClient {
    async fn score(&self, question: &str, passages: &[Passage]) -> Result<Vec<f32>> {
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": question, "texts": texts }))
            .send()
            .await
            .map_err(|e| RagError::RerankerFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RagError::RerankerFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| RagError::RerankerFailed(e.to_string()))?;

        Ok(body.scores)
    }
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    scores: Vec<f32>,
}

/// Deterministic lexical-overlap scorer.
///
/// Scores a passage by the fraction of question words (longer than 3
/// chars, case-folded) it contains. No external dependency; used for
/// offline operation and tests.
#[derive(Debug, Clone, Default)]
pub struct OverlapScorer;

impl OverlapScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn overlap(question: &str, text: &str) -> f32 {
        let text_lower = text.to_lowercase();
        let words: Vec<String> = question
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty())
            .collect();

        if words.is_empty() {
            return 0.0;
        }

        let matches = words.iter().filter(|w| text_lower.contains(w.as_str())).count();
        matches as f32 / words.len() as f32
    }
}

#[async_trait]
impl RelevanceScorer for OverlapScorer {
    async fn score(&self, question: &str, passages: &[Passage]) -> Result<Vec<f32>> {
        Ok(passages
            .iter()
            .map(|p| Self::overlap(question, &p.text))
            .collect())
    }
}

/// Re-scores fused candidates and keeps the top-k.
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
    config: RerankConfig,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>, config: RerankConfig) -> Self {
        Self { scorer, config }
    }

    /// Rerank the fused result set.
    ///
    /// Fails with `RERANKER_FAILED` when the scoring call errors or
    /// returns a score count that does not match the pool; the fallback
    /// policy belongs to the orchestrator.
    pub async fn rerank(&self, question: &str, fused: &RetrievalResult) -> Result<RetrievalResult> {
        let pool: Vec<Passage> = fused
            .passages
            .iter()
            .take(self.config.candidate_pool)
            .cloned()
            .collect();

        if pool.is_empty() {
            return Ok(RetrievalResult::empty(Stage::Reranked));
        }

        let scores = self.scorer.score(question, &pool).await?;

        if scores.len() != pool.len() {
            return Err(RagError::RerankerFailed(format!(
                "scorer returned {} scores for {} passages",
                scores.len(),
                pool.len()
            )));
        }

        // Keep the fused rank as the secondary sort key.
        let mut scored: Vec<(usize, Passage)> = pool
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(rank, (mut passage, score))| {
                passage.rerank_score = Some(score);
                (rank, passage)
            })
            .collect();

        scored.sort_by(|(rank_a, a), (rank_b, b)| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(Ordering::Equal)
                .then(rank_a.cmp(rank_b))
                .then(a.id.cmp(&b.id))
        });

        let passages = scored
            .into_iter()
            .take(self.config.top_k)
            .map(|(_, passage)| passage)
            .collect();

        Ok(RetrievalResult {
            stage: Stage::Reranked,
            passages,
            elapsed_ms: 0,
        })
    }

    pub fn config(&self) -> &RerankConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScorer(Vec<f32>);

    #[async_trait]
    impl RelevanceScorer for FixedScorer {
        async fn score(&self, _question: &str, passages: &[Passage]) -> Result<Vec<f32>> {
            Ok(self.0.iter().copied().take(passages.len()).collect())
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl RelevanceScorer for FailingScorer {
        async fn score(&self, _question: &str, _passages: &[Passage]) -> Result<Vec<f32>> {
            Err(RagError::RerankerFailed("scoring service down".into()))
        }
    }

    fn fused_result(ids: &[&str]) -> RetrievalResult {
        let passages = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut p = Passage::new(*id, format!("text {}", id), "doc1", "Doc One");
                p.fused_score = Some(1.0 / (61.0 + i as f32));
                p
            })
            .collect();
        RetrievalResult {
            stage: Stage::Fused,
            passages,
            elapsed_ms: 0,
        }
    }

    fn config(pool: usize, top_k: usize) -> RerankConfig {
        RerankConfig {
            candidate_pool: pool,
            top_k,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_rerank_sorts_by_score() {
        let reranker = Reranker::new(
            Arc::new(FixedScorer(vec![0.2, 0.9, 0.5])),
            config(20, 5),
        );
        let reranked = reranker
            .rerank("query", &fused_result(&["a", "b", "c"]))
            .await
            .unwrap();

        let ids: Vec<_> = reranked.passages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(reranked.passages[0].rerank_score, Some(0.9));
    }

    #[tokio::test]
    async fn test_ties_broken_by_fused_rank() {
        let reranker = Reranker::new(
            Arc::new(FixedScorer(vec![0.5, 0.5, 0.5])),
            config(20, 5),
        );
        let reranked = reranker
            .rerank("query", &fused_result(&["c", "a", "b"]))
            .await
            .unwrap();

        // Equal scores keep the fused ordering.
        let ids: Vec<_> = reranked.passages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_pool_cap_and_truncation() {
        let reranker = Reranker::new(
            Arc::new(FixedScorer(vec![0.1, 0.2, 0.3, 0.4])),
            config(2, 1),
        );
        let reranked = reranker
            .rerank("query", &fused_result(&["a", "b", "c", "d"]))
            .await
            .unwrap();

        // Only the first two candidates were scored; top-1 kept.
        assert_eq!(reranked.len(), 1);
        assert_eq!(reranked.passages[0].id, "b");
    }

    #[tokio::test]
    async fn test_scorer_failure_propagates() {
        let reranker = Reranker::new(Arc::new(FailingScorer), config(20, 5));
        let err = reranker
            .rerank("query", &fused_result(&["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::RerankerFailed(_)));
    }

    #[tokio::test]
    async fn test_score_count_mismatch_fails() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![0.5])), config(20, 5));
        let err = reranker
            .rerank("query", &fused_result(&["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::RerankerFailed(_)));
    }

    #[tokio::test]
    async fn test_determinism_across_calls() {
        let fused = fused_result(&["a", "b", "c"]);
        let reranker = Reranker::new(Arc::new(OverlapScorer::new()), config(20, 5));

        let first = reranker.rerank("text a please", &fused).await.unwrap();
        let second = reranker.rerank("text a please", &fused).await.unwrap();

        let ids_a: Vec<_> = first.passages.iter().map(|p| &p.id).collect();
        let ids_b: Vec<_> = second.passages.iter().map(|p| &p.id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_overlap_scorer() {
        let score = OverlapScorer::overlap(
            "What is the budget approval process?",
            "The budget approval process has three steps.",
        );
        assert!(score > 0.5);

        let zero = OverlapScorer::overlap("budget approval", "unrelated content entirely");
        assert_eq!(zero, 0.0);
    }
}
