//! Grounded answer generation
//!
//! Two implementations behind one capability interface: an LLM-backed
//! generator that answers strictly from the supplied passages with
//! inline citation markers, and a deterministic extractive fallback
//! with no external dependency.
//!
//! Components:
//! - Generator trait + GeneratedAnswer
//! - Citation marker parsing and context resolution
//! - OllamaGenerator: grounded prompt over the assembled context
//! - ExtractiveGenerator: lexical-overlap sentence selection

pub mod extractive;
pub mod llm;

pub use extractive::ExtractiveGenerator;
pub use llm::OllamaGenerator;

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::Context;

/// Fixed phrase used both when generation refuses for lack of evidence
/// and for the no-results pipeline outcome.
pub const INSUFFICIENT_DATA_ANSWER: &str = "Insufficient data for a definitive answer.";

/// Raw generation output: answer text plus the ids of the context
/// passages it actually referenced.
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub text: String,
    pub cited_passage_ids: Vec<String>,
}

/// Capability interface for answer generation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, question: &str, context: &Context) -> Result<GeneratedAnswer>;
}

/// One `[source: doc_id, page N]` marker parsed from answer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMarker {
    pub doc_id: String,
    pub page: Option<u32>,
}

/// Parse `[source: doc_id, page N]` markers from answer text.
///
/// Malformed markers (no closing bracket, empty doc id) are skipped;
/// the page part is optional.
pub fn parse_citation_markers(text: &str) -> Vec<CitationMarker> {
    let mut markers = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("[source:") {
        let after = &rest[start + "[source:".len()..];
        let Some(end) = after.find(']') else {
            break;
        };

        let inner = &after[..end];
        let (doc_part, page_part) = match inner.split_once(',') {
            Some((doc, page)) => (doc, Some(page)),
            None => (inner, None),
        };

        let doc_id = doc_part.trim().to_string();
        if !doc_id.is_empty() {
            let page = page_part.and_then(|p| {
                p.trim()
                    .trim_start_matches("page")
                    .trim()
                    .parse::<u32>()
                    .ok()
            });
            markers.push(CitationMarker { doc_id, page });
        }

        rest = &after[end + 1..];
    }

    markers
}

/// Citation markers resolved against the generation context.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCitations {
    /// Ids of cited context passages, in context order, deduplicated.
    pub passage_ids: Vec<String>,
    /// Markers that did not map to any context passage and were
    /// dropped (never fabricated into citations).
    pub dropped: usize,
}

/// Map parsed markers onto context passages.
///
/// A marker matches a passage when the document ids agree and, if the
/// marker names a page, the pages agree too.
pub fn resolve_citations(markers: &[CitationMarker], context: &Context) -> ResolvedCitations {
    let mut resolved = ResolvedCitations::default();

    for marker in markers {
        let matched = context.passages.iter().find(|p| {
            p.source_document_id == marker.doc_id
                && (marker.page.is_none() || p.page == marker.page)
        });

        match matched {
            Some(passage) => {
                if !resolved.passage_ids.contains(&passage.id) {
                    resolved.passage_ids.push(passage.id.clone());
                }
            }
            None => resolved.dropped += 1,
        }
    }

    // Context order, not citation order, for deterministic output.
    resolved.passage_ids.sort_by_key(|id| {
        context
            .passages
            .iter()
            .position(|p| &p.id == id)
            .unwrap_or(usize::MAX)
    });

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Passage;

    fn context_with(entries: &[(&str, &str, Option<u32>)]) -> Context {
        let passages = entries
            .iter()
            .map(|(id, doc, page)| {
                let mut p = Passage::new(*id, "text", *doc, "Title");
                p.page = *page;
                p
            })
            .collect();
        Context {
            passages,
            total_tokens: 10,
        }
    }

    #[test]
    fn test_parse_well_formed_markers() {
        let markers =
            parse_citation_markers("Three steps apply [source: doc1, page 4] as stated.");
        assert_eq!(
            markers,
            vec![CitationMarker {
                doc_id: "doc1".to_string(),
                page: Some(4)
            }]
        );
    }

    #[test]
    fn test_parse_marker_without_page() {
        let markers = parse_citation_markers("See [source: handbook].");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].doc_id, "handbook");
        assert_eq!(markers[0].page, None);
    }

    #[test]
    fn test_parse_skips_malformed_markers() {
        assert!(parse_citation_markers("Broken [source: doc1, page 4").is_empty());
        assert!(parse_citation_markers("Empty [source: ]").is_empty());
        assert!(parse_citation_markers("No markers here.").is_empty());
    }

    #[test]
    fn test_parse_multiple_markers() {
        let markers = parse_citation_markers(
            "A [source: doc1, page 4]. B [source: doc2, page 7].",
        );
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[1].doc_id, "doc2");
        assert_eq!(markers[1].page, Some(7));
    }

    #[test]
    fn test_resolve_drops_unknown_markers() {
        let context = context_with(&[("p1", "doc1", Some(4))]);
        let markers = vec![
            CitationMarker {
                doc_id: "doc1".to_string(),
                page: Some(4),
            },
            CitationMarker {
                doc_id: "ghost".to_string(),
                page: None,
            },
        ];

        let resolved = resolve_citations(&markers, &context);
        assert_eq!(resolved.passage_ids, vec!["p1".to_string()]);
        assert_eq!(resolved.dropped, 1);
    }

    #[test]
    fn test_resolve_orders_by_context_and_dedups() {
        let context = context_with(&[("p1", "doc1", Some(1)), ("p2", "doc2", Some(2))]);
        let markers = vec![
            CitationMarker {
                doc_id: "doc2".to_string(),
                page: Some(2),
            },
            CitationMarker {
                doc_id: "doc1".to_string(),
                page: Some(1),
            },
            CitationMarker {
                doc_id: "doc2".to_string(),
                page: Some(2),
            },
        ];

        let resolved = resolve_citations(&markers, &context);
        assert_eq!(
            resolved.passage_ids,
            vec!["p1".to_string(), "p2".to_string()]
        );
        assert_eq!(resolved.dropped, 0);
    }

    #[test]
    fn test_page_mismatch_does_not_resolve() {
        let context = context_with(&[("p1", "doc1", Some(4))]);
        let markers = vec![CitationMarker {
            doc_id: "doc1".to_string(),
            page: Some(9),
        }];

        let resolved = resolve_citations(&markers, &context);
        assert!(resolved.passage_ids.is_empty());
        assert_eq!(resolved.dropped, 1);
    }
}
