//! Context assembly under a token budget
//!
//! Packs reranked passages in rank order until the next passage would
//! exceed the budget. A passage is never truncated mid-text: it fits
//! whole or is excluded. Token counts use the shared chars/4 estimate.

use crate::config::ContextConfig;
use crate::types::{Context, RetrievalResult};

/// Packs reranked passages into a token-bounded context window.
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Assemble a context from the reranked result set.
    ///
    /// Empty output means the orchestrator should treat the request as
    /// having no usable evidence, the same as an empty fused set.
    pub fn assemble(&self, reranked: &RetrievalResult) -> Context {
        let mut passages = Vec::new();
        let mut total_tokens = 0;

        for passage in &reranked.passages {
            let tokens = passage.estimated_tokens();
            if total_tokens + tokens > self.config.max_tokens {
                break;
            }
            total_tokens += tokens;
            passages.push(passage.clone());
        }

        Context {
            passages,
            total_tokens,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Passage, Stage};
    use quickcheck_macros::quickcheck;

    fn result_with_sizes(sizes: &[usize]) -> RetrievalResult {
        let passages = sizes
            .iter()
            .enumerate()
            .map(|(i, chars)| {
                let mut p = Passage::new(
                    format!("p{}", i),
                    "x".repeat(*chars),
                    "doc1",
                    "Doc One",
                );
                p.rerank_score = Some(1.0 - 0.1 * i as f32);
                p
            })
            .collect();
        RetrievalResult {
            stage: Stage::Reranked,
            passages,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_empty_input_empty_context() {
        let assembler = ContextAssembler::new();
        let context = assembler.assemble(&RetrievalResult::empty(Stage::Reranked));
        assert!(context.is_empty());
        assert_eq!(context.total_tokens, 0);
    }

    #[test]
    fn test_all_fit_within_budget() {
        let assembler = ContextAssembler::with_config(ContextConfig { max_tokens: 100 });
        // 40 chars = 10 tokens each
        let context = assembler.assemble(&result_with_sizes(&[40, 40, 40]));
        assert_eq!(context.passages.len(), 3);
        assert_eq!(context.total_tokens, 30);
    }

    #[test]
    fn test_stops_before_budget_overflow() {
        let assembler = ContextAssembler::with_config(ContextConfig { max_tokens: 25 });
        // 10 + 10 tokens fit, the third would overflow
        let context = assembler.assemble(&result_with_sizes(&[40, 40, 40]));
        assert_eq!(context.passages.len(), 2);
        assert_eq!(context.total_tokens, 20);
    }

    #[test]
    fn test_never_truncates_a_passage() {
        let assembler = ContextAssembler::with_config(ContextConfig { max_tokens: 5 });
        // Single 10-token passage exceeds the budget: context is empty.
        let context = assembler.assemble(&result_with_sizes(&[40]));
        assert!(context.is_empty());
    }

    #[quickcheck]
    fn prop_total_never_exceeds_budget(sizes: Vec<u16>, budget: u16) -> bool {
        let sizes: Vec<usize> = sizes.into_iter().map(|s| s as usize).collect();
        let assembler = ContextAssembler::with_config(ContextConfig {
            max_tokens: budget as usize,
        });
        let context = assembler.assemble(&result_with_sizes(&sizes));
        context.total_tokens <= budget as usize
    }
}
