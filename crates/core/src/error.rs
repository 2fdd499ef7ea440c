//! Error types shared across the workspace
//!
//! The taxonomy distinguishes conditions that degrade the pipeline from
//! conditions that fail a request. Stage-local recoverable errors
//! (scorer unavailable, empty corpus) are absorbed by the pipeline and
//! never reach the caller as failures.

use thiserror::Error;

/// Result alias using the shared error type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error taxonomy
#[derive(Error, Debug)]
pub enum Error {
    /// Vector store unreachable. Retryable once with backoff.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// Cross-encoder unreachable. The reranker degrades to the
    /// pre-rerank order instead of failing the request.
    #[error("reranker unavailable: {0}")]
    ScorerUnavailable(String),

    /// Generation failed mid-stream. Fatal to the current request only.
    #[error("generation failed: {0}")]
    GeneratorFailure(String),

    /// One document could not be parsed during ingestion. Recorded and
    /// skipped; never aborts the batch.
    #[error("malformed document {document_id}: {reason}")]
    MalformedDocument { document_id: String, reason: String },

    /// Configuration error at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Retrieval pipeline error not covered by a more specific variant
    #[error("retrieval error: {0}")]
    Retrieval(String),
}

impl Error {
    /// Whether the operation that produced this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// Whether this error fails the whole request (as opposed to
    /// degrading one pipeline stage)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::GeneratorFailure(_) | Error::Configuration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(Error::StoreUnavailable("down".into()).is_retryable());
        assert!(!Error::ScorerUnavailable("down".into()).is_retryable());
    }

    #[test]
    fn test_fatal() {
        assert!(Error::GeneratorFailure("boom".into()).is_fatal());
        assert!(!Error::ScorerUnavailable("down".into()).is_fatal());
        assert!(!Error::MalformedDocument {
            document_id: "doc-1".into(),
            reason: "empty".into()
        }
        .is_fatal());
    }
}
