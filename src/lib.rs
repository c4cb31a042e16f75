//! LocalRAG - Citation-grounded question answering
//!
//! Answers natural-language questions over an indexed local document
//! corpus by combining lexical (BM25) and dense retrieval, reciprocal
//! rank fusion, cross-encoder reranking, token-bounded context
//! assembly, and grounded generation with citation enforcement.
//!
//! # Architecture
//!
//! question -> [lexical ∥ vector] -> fusion -> rerank -> context ->
//! generation -> answer + citations + debug trace
//!
//! Document parsing, chunking, embedding computation, index population,
//! and HTTP serving are external collaborators consumed through the
//! backend traits.

pub mod errors;
pub mod types;
pub mod config;
pub mod trace;

pub mod retrieval;
pub mod fusion;
pub mod rerank;
pub mod context;
pub mod generation;
pub mod confidence;
pub mod pipeline;

pub mod cli;

// Re-export commonly used types
pub use errors::{ErrorCode, RagError, Result};
pub use pipeline::{AnswerPipeline, PipelineFailure, PipelineState};
pub use types::{AnswerResult, Citation, Context, Passage, RetrievalResult, Stage};
