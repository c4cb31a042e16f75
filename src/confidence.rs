//! Confidence scoring
//!
//! The confidence score is the mean rerank score of the passages that
//! were actually cited, min-max normalized against the reranked pool's
//! score range. It is a monotonic proxy in [0, 1], not a probability.

use crate::types::RetrievalResult;

/// Score confidence for the cited passage ids against the reranked pool.
///
/// Empty citations yield 0.0. A degenerate pool range (all scores
/// equal) yields 1.0 for any cited passage, since the cited evidence is
/// as relevant as anything retrieved.
pub fn confidence_score(cited_passage_ids: &[String], reranked: &RetrievalResult) -> f32 {
    if cited_passage_ids.is_empty() {
        return 0.0;
    }

    let pool: Vec<f32> = reranked
        .passages
        .iter()
        .filter_map(|p| p.rerank_score)
        .collect();

    if pool.is_empty() {
        return 0.0;
    }

    let min = pool.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = pool.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    let cited: Vec<f32> = reranked
        .passages
        .iter()
        .filter(|p| cited_passage_ids.contains(&p.id))
        .filter_map(|p| p.rerank_score)
        .collect();

    if cited.is_empty() {
        return 0.0;
    }

    let mean = if range <= f32::EPSILON {
        1.0
    } else {
        cited.iter().map(|s| (s - min) / range).sum::<f32>() / cited.len() as f32
    };

    mean.clamp(0.0, 1.0)
}
