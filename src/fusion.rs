//! Reciprocal rank fusion of lexical and vector result sets
//!
//! BM25 scores and cosine similarities are not on comparable scales, so
//! fusion works on ranks only: the passage at rank r (1-indexed) in a
//! source contributes 1/(k + r) to its fused score. A passage missing
//! from one source contributes 0 from that source.
//!
//! Ordering is total and reproducible: fused score descending, then
//! passages found by both sources ahead of single-source passages, then
//! passage id ascending.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use crate::config::FusionConfig;
use crate::types::{Passage, RetrievalResult, Stage};

struct FusedEntry {
    passage: Passage,
    fused_score: f32,
    source_count: u8,
}

/// Merges the two independently ranked result sets into one.
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new() -> Self {
        Self {
            config: FusionConfig::default(),
        }
    }

    pub fn with_config(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse the lexical and vector result sets.
    ///
    /// Two empty inputs produce an empty result, not an error; the
    /// orchestrator maps that to the no-results outcome.
    pub fn fuse(&self, lexical: &RetrievalResult, vector: &RetrievalResult) -> RetrievalResult {
        let start = Instant::now();
        let mut entries: HashMap<String, FusedEntry> = HashMap::new();

        for source in [lexical, vector] {
            for (index, passage) in source.passages.iter().enumerate() {
                let contribution = 1.0 / (self.config.k + (index + 1) as f32);

                match entries.get_mut(&passage.id) {
                    Some(entry) => {
                        entry.fused_score += contribution;
                        entry.source_count += 1;
                        merge_scores(&mut entry.passage, passage);
                    }
                    None => {
                        entries.insert(
                            passage.id.clone(),
                            FusedEntry {
                                passage: passage.clone(),
                                fused_score: contribution,
                                source_count: 1,
                            },
                        );
                    }
                }
            }
        }

        let mut fused: Vec<FusedEntry> = entries.into_values().collect();
        fused.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(Ordering::Equal)
                .then(b.source_count.cmp(&a.source_count))
                .then(a.passage.id.cmp(&b.passage.id))
        });

        let passages = fused
            .into_iter()
            .map(|entry| {
                let mut passage = entry.passage;
                passage.fused_score = Some(entry.fused_score);
                passage
            })
            .collect();

        RetrievalResult {
            stage: Stage::Fused,
            passages,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Carry both raw score annotations onto the merged passage, keeping
/// the max when both sides set the same field.
fn merge_scores(merged: &mut Passage, other: &Passage) {
    merged.lexical_score = max_score(merged.lexical_score, other.lexical_score);
    merged.vector_score = max_score(merged.vector_score, other.vector_score);
}

fn max_score(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexical_result(ids: &[&str]) -> RetrievalResult {
        let passages = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut p = Passage::new(*id, format!("text {}", id), "doc1", "Doc One");
                p.lexical_score = Some(10.0 - i as f32);
                p
            })
            .collect();
        RetrievalResult {
            stage: Stage::Lexical,
            passages,
            elapsed_ms: 0,
        }
    }

    fn vector_result(ids: &[&str]) -> RetrievalResult {
        let passages = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut p = Passage::new(*id, format!("text {}", id), "doc1", "Doc One");
                p.vector_score = Some(0.9 - 0.1 * i as f32);
                p
            })
            .collect();
        RetrievalResult {
            stage: Stage::Vector,
            passages,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_both_empty_is_empty_not_error() {
        let engine = FusionEngine::new();
        let fused = engine.fuse(
            &RetrievalResult::empty(Stage::Lexical),
            &RetrievalResult::empty(Stage::Vector),
        );
        assert!(fused.is_empty());
        assert_eq!(fused.stage, Stage::Fused);
    }

    #[test]
    fn test_disjoint_sets_ranked_by_rrf() {
        let engine = FusionEngine::new();
        let fused = engine.fuse(&lexical_result(&["a", "b"]), &vector_result(&["c", "d"]));

        assert_eq!(fused.len(), 4);
        // Rank-1 passages share 1/61; tie broken by id ascending.
        assert_eq!(fused.passages[0].id, "a");
        assert_eq!(fused.passages[1].id, "c");
        assert_eq!(fused.passages[2].id, "b");
        assert_eq!(fused.passages[3].id, "d");

        let expected = 1.0 / 61.0;
        assert!((fused.passages[0].fused_score.unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_passage_deduplicated_with_summed_score() {
        let engine = FusionEngine::new();
        let fused = engine.fuse(&lexical_result(&["p1"]), &vector_result(&["p1", "p2"]));

        assert_eq!(fused.len(), 2);
        assert_eq!(fused.passages[0].id, "p1");

        let combined = fused.passages[0].fused_score.unwrap();
        let single = 1.0 / 61.0;
        assert!(combined > single);
        assert!((combined - 2.0 * single).abs() < 1e-6);

        // Both raw scores survive the merge.
        assert!(fused.passages[0].lexical_score.is_some());
        assert!(fused.passages[0].vector_score.is_some());
    }

    #[test]
    fn test_both_sources_outrank_single_source_at_equal_score() {
        // With k=0: "a" is rank 1 in lexical only (1/1 = 1.0) while "b"
        // is rank 2 in both sources (1/2 + 1/2 = 1.0). Equal fused
        // scores, but presence in both sources must win.
        let engine = FusionEngine::with_config(FusionConfig { k: 0.0 });
        let fused = engine.fuse(&lexical_result(&["a", "b"]), &vector_result(&["c", "b"]));

        assert_eq!(fused.passages[0].id, "b");
        assert_eq!(fused.passages[1].id, "a"); // tie with c broken by id
        assert_eq!(fused.passages[2].id, "c");
    }

    #[test]
    fn test_one_empty_source_passes_through() {
        let engine = FusionEngine::new();
        let fused = engine.fuse(&lexical_result(&["a", "b"]), &RetrievalResult::empty(Stage::Vector));

        assert_eq!(fused.len(), 2);
        assert_eq!(fused.passages[0].id, "a");
        assert_eq!(fused.passages[1].id, "b");
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let engine = FusionEngine::new();
        let a = engine.fuse(&lexical_result(&["a", "b", "c"]), &vector_result(&["c", "d"]));
        let b = engine.fuse(&lexical_result(&["a", "b", "c"]), &vector_result(&["c", "d"]));

        let ids_a: Vec<_> = a.passages.iter().map(|p| &p.id).collect();
        let ids_b: Vec<_> = b.passages.iter().map(|p| &p.id).collect();
        assert_eq!(ids_a, ids_b);
    }
}
