//! Core data model for the query-answering pipeline
//!
//! Passages flow through the stages immutably; each stage annotates its
//! own score field and produces a fresh [`RetrievalResult`]. Identity is
//! the passage `id` and is stable across stages.

use serde::{Deserialize, Serialize};

use crate::errors::ErrorCode;

/// A retrieved chunk of a source document.
///
/// Scores are stage-specific annotations added progressively; a passage
/// never appears twice in one result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    pub source_document_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl Passage {
    /// Create a bare passage with no score annotations.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        source_document_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_document_id: source_document_id.into(),
            title: title.into(),
            section: None,
            page: None,
            lexical_score: None,
            vector_score: None,
            fused_score: None,
            rerank_score: None,
        }
    }

    /// Rough token estimate (~4 chars per token).
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Rough token estimate (~4 chars per token), shared by context assembly
/// and generation caps.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Which stage produced a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lexical,
    Vector,
    Fused,
    Reranked,
}

/// Ordered passages produced by one stage, read-only downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub stage: Stage,
    pub passages: Vec<Passage>,
    pub elapsed_ms: u64,
}

impl RetrievalResult {
    pub fn empty(stage: Stage) -> Self {
        Self {
            stage,
            passages: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }
}

/// Token-bounded selection of passages handed to generation.
///
/// Invariant: `total_tokens` never exceeds the configured budget, and
/// passages are ordered by descending rerank score (ties by fused rank,
/// then id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub passages: Vec<Passage>,
    pub total_tokens: usize,
}

impl Context {
    pub fn empty() -> Self {
        Self {
            passages: Vec::new(),
            total_tokens: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Find a context passage by id.
    pub fn passage(&self, id: &str) -> Option<&Passage> {
        self.passages.iter().find(|p| p.id == id)
    }
}

/// Source reference attached to an answer, derived 1:1 from a passage
/// present in the generation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub doc_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl From<&Passage> for Citation {
    fn from(passage: &Passage) -> Self {
        Self {
            source: passage.source_document_id.clone(),
            doc_title: passage.title.clone(),
            section: passage.section.clone(),
            page: passage.page,
        }
    }
}

/// Per-request debug payload returned with every terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub trace_id: String,
    pub bm25_time_ms: u64,
    pub dense_time_ms: u64,
    pub rerank_time_ms: u64,
    pub generation_time_ms: u64,
    pub total_time_ms: u64,
    pub confidence_score: f32,
    /// Degradations recorded along the way (rerank fallback, extractive
    /// fallback, single-source retrieval, dropped citation markers).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub degradations: Vec<String>,
    /// Set when citation markers were dropped and none survived while
    /// the answer text still claims evidence.
    #[serde(default)]
    pub citations_incomplete: bool,
}

/// Final pipeline output, constructed once per request and immutable
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub debug: DebugInfo,
}

/// Tagged per-stage outcome making degradation visible to the
/// orchestrator rather than silently swallowed.
#[derive(Debug, Clone)]
pub enum StageOutcome<T> {
    Ok(T),
    Degraded(T, String),
    Failed(ErrorCode),
}

impl<T> StageOutcome<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::Degraded(_, _))
    }

    /// Consume into the carried value plus an optional degradation note.
    pub fn into_parts(self) -> std::result::Result<(T, Option<String>), ErrorCode> {
        match self {
            StageOutcome::Ok(value) => Ok((value, None)),
            StageOutcome::Degraded(value, reason) => Ok((value, Some(reason))),
            StageOutcome::Failed(code) => Err(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passage_token_estimate() {
        let passage = Passage::new("p1", "abcdefgh", "doc1", "Doc One");
        assert_eq!(passage.estimated_tokens(), 2);
    }

    #[test]
    fn test_citation_from_passage() {
        let mut passage = Passage::new("p1", "text", "doc1", "Financial Policy");
        passage.page = Some(4);

        let citation = Citation::from(&passage);
        assert_eq!(citation.source, "doc1");
        assert_eq!(citation.doc_title, "Financial Policy");
        assert_eq!(citation.page, Some(4));
        assert!(citation.section.is_none());
    }

    #[test]
    fn test_context_lookup() {
        let context = Context {
            passages: vec![Passage::new("p1", "text", "doc1", "Doc")],
            total_tokens: 1,
        };
        assert!(context.passage("p1").is_some());
        assert!(context.passage("p2").is_none());
    }

    #[test]
    fn test_stage_outcome_parts() {
        let outcome: StageOutcome<u32> = StageOutcome::Degraded(7, "fallback".to_string());
        assert!(outcome.is_degraded());
        let (value, note) = outcome.into_parts().unwrap();
        assert_eq!(value, 7);
        assert_eq!(note.as_deref(), Some("fallback"));

        let failed: StageOutcome<u32> = StageOutcome::Failed(ErrorCode::RerankerFailed);
        assert!(failed.into_parts().is_err());
    }

    #[test]
    fn test_retrieval_result_serialization() {
        let result = RetrievalResult {
            stage: Stage::Lexical,
            passages: vec![],
            elapsed_ms: 12,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"lexical\""));
    }
}
