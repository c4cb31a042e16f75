//! Error types for the LocalRAG query pipeline
//!
//! Component errors map onto a stable, caller-facing error taxonomy so
//! the serving layer can report coded failures without leaking internal
//! detail (prompts, backend payloads, stack traces).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingQuestion,
    InvalidQuestion,
    /// Empty evidence is a valid outcome, delivered as a success-shaped
    /// response; the code exists for symmetry with the other kinds.
    NoResults,
    BackendUnavailable,
    BackendError,
    RerankerFailed,
    LlmFailed,
    Timeout,
    UnknownError,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingQuestion => "MISSING_QUESTION",
            ErrorCode::InvalidQuestion => "INVALID_QUESTION",
            ErrorCode::NoResults => "NO_RESULTS",
            ErrorCode::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ErrorCode::BackendError => "BACKEND_ERROR",
            ErrorCode::RerankerFailed => "RERANKER_FAILED",
            ErrorCode::LlmFailed => "LLM_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for pipeline components
#[derive(Error, Debug)]
pub enum RagError {
    /// Question was empty or whitespace
    #[error("Question is missing")]
    MissingQuestion,

    /// Question failed validation
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    /// Retrieval backend could not be reached or timed out
    #[error("Retrieval backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Retrieval backend returned a malformed response
    #[error("Retrieval backend error: {0}")]
    BackendError(String),

    /// Cross-encoder scoring call errored or timed out
    #[error("Reranker failed: {0}")]
    RerankerFailed(String),

    /// Generation failed and no fallback remained
    #[error("Generation failed: {0}")]
    LlmFailed(String),

    /// A stage or the whole pipeline exceeded its deadline
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic errors with context
    #[error("Pipeline error: {0}")]
    Generic(String),
}

impl RagError {
    /// Map onto the caller-facing taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            RagError::MissingQuestion => ErrorCode::MissingQuestion,
            RagError::InvalidQuestion(_) => ErrorCode::InvalidQuestion,
            RagError::BackendUnavailable(_) => ErrorCode::BackendUnavailable,
            RagError::BackendError(_) => ErrorCode::BackendError,
            RagError::RerankerFailed(_) => ErrorCode::RerankerFailed,
            RagError::LlmFailed(_) => ErrorCode::LlmFailed,
            RagError::Timeout { .. } => ErrorCode::Timeout,
            RagError::ConfigError(_) | RagError::Generic(_) => ErrorCode::UnknownError,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::Timeout { duration_ms: 10_000 };
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RagError::MissingQuestion.code().as_str(),
            "MISSING_QUESTION"
        );
        assert_eq!(
            RagError::BackendUnavailable("down".into()).code(),
            ErrorCode::BackendUnavailable
        );
        assert_eq!(
            RagError::Generic("oops".into()).code(),
            ErrorCode::UnknownError
        );
    }

    #[test]
    fn test_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::RerankerFailed).unwrap();
        assert_eq!(json, "\"RERANKER_FAILED\"");
    }
}
