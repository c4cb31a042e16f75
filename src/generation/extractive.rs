//! Deterministic extractive fallback
//!
//! When the LLM backend is unavailable, selects the context sentences
//! most lexically overlapping the question and concatenates them with
//! per-sentence citation markers. No external dependency; identical
//! input always yields identical output, so the pipeline degrades
//! rather than failing end-to-end.

use async_trait::async_trait;
use std::cmp::Ordering;

use crate::errors::{RagError, Result};
use crate::generation::{GeneratedAnswer, Generator};
use crate::rerank::OverlapScorer;
use crate::types::{Context, Passage};

/// Extractive answer generator
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    max_sentences: usize,
}

impl ExtractiveGenerator {
    pub fn new(max_sentences: usize) -> Self {
        Self { max_sentences }
    }

    /// Split passage text into sentences on terminal punctuation.
    fn sentences(text: &str) -> Vec<&str> {
        text.split_inclusive(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn citation_marker(passage: &Passage) -> String {
        match passage.page {
            Some(page) => format!("[source: {}, page {}]", passage.source_document_id, page),
            None => format!("[source: {}]", passage.source_document_id),
        }
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate(&self, question: &str, context: &Context) -> Result<GeneratedAnswer> {
        if context.is_empty() {
            return Err(RagError::LlmFailed(
                "extractive fallback requires a non-empty context".to_string(),
            ));
        }

        // (score, passage rank, sentence index) gives a total order.
        let mut candidates: Vec<(f32, usize, usize, &str, &Passage)> = Vec::new();
        for (passage_rank, passage) in context.passages.iter().enumerate() {
            for (sentence_index, sentence) in Self::sentences(&passage.text).into_iter().enumerate() {
                let score = OverlapScorer::overlap(question, sentence);
                candidates.push((score, passage_rank, sentence_index, sentence, passage));
            }
        }

        if candidates.is_empty() {
            return Err(RagError::LlmFailed(
                "context passages contain no sentences".to_string(),
            ));
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        // Keep overlapping sentences; fall back to the top-ranked
        // passage's first sentence when nothing overlaps.
        let mut selected: Vec<(usize, usize, &str, &Passage)> = candidates
            .iter()
            .filter(|(score, ..)| *score > 0.0)
            .take(self.max_sentences)
            .map(|(_, rank, index, sentence, passage)| (*rank, *index, *sentence, *passage))
            .collect();

        if selected.is_empty() {
            let (_, rank, index, sentence, passage) = candidates[0];
            selected.push((rank, index, sentence, passage));
        }

        // Present in document order for readability.
        selected.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut parts = Vec::with_capacity(selected.len());
        let mut cited_passage_ids = Vec::new();
        for (_, _, sentence, passage) in &selected {
            parts.push(format!("{} {}", sentence, Self::citation_marker(passage)));
            if !cited_passage_ids.contains(&passage.id) {
                cited_passage_ids.push(passage.id.clone());
            }
        }

        Ok(GeneratedAnswer {
            text: parts.join(" "),
            cited_passage_ids,
        })
    }
}
