//! Retrieval pipeline for Vietnamese legal question answering
//!
//! Features:
//! - Structure-aware legal text splitting (Chương / Điều / Khoản)
//! - Parent/child chunking with a local parent store
//! - Hybrid dense+sparse search via Qdrant with server-side fusion
//! - Score-preserving parent resolution
//! - Cross-encoder reranking with sigmoid normalization and graceful
//!   degradation
//! - History-aware query condensation
//! - Streaming answer chain (citations first, then tokens)
//! - Background ingestion with pollable progress

pub mod chain;
pub mod condenser;
pub mod embeddings;
pub mod ingestion;
pub mod parent_store;
pub mod reranker;
pub mod resolver;
pub mod retriever;
pub mod sources;
pub mod splitter;
pub mod vector_store;

pub use chain::{Answer, AnswerEvent, ChainConfig, RagChain};
pub use condenser::QueryCondenser;
pub use embeddings::{
    DenseEmbedder, EmbeddingConfig, SimpleEmbedder, SparseEncoder, SparseVector,
    TermFrequencyEncoder,
};
pub use ingestion::{IngestProgress, IngestReport, Ingestor, IngestorConfig, RawDocument};
pub use parent_store::{InMemoryParentStore, ParentStore};
pub use reranker::{
    CrossEncoder, HttpCrossEncoder, KeywordScorer, RerankedParent, Reranker, RerankerConfig,
};
pub use resolver::{resolve_parents, ChildHit, ParentCandidate};
pub use retriever::{RetrievalResult, Retriever, RetrieverConfig};
pub use sources::extract_citations;
pub use splitter::{
    ChildChunk, LegalTextSplitter, LegalUnit, ParentChunk, ParentSplit, SplitterConfig, UnitKind,
};
pub use vector_store::{ChildPoint, HybridIndex, QdrantIndex, QdrantIndexConfig};

use thiserror::Error;

/// Retrieval pipeline errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("Parent store error: {0}")]
    ParentStore(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for legal_assistant_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::VectorStore(e) | RagError::Connection(e) | RagError::Search(e) => {
                legal_assistant_core::Error::StoreUnavailable(e)
            }
            RagError::Reranker(e) => legal_assistant_core::Error::ScorerUnavailable(e),
            RagError::Generation(e) => legal_assistant_core::Error::GeneratorFailure(e),
            other => legal_assistant_core::Error::Retrieval(other.to_string()),
        }
    }
}
