//! Centralized constants for the legal assistant
//!
//! Single source of truth for retrieval defaults and service endpoints.
//! Settings structs reference these instead of repeating literals.

/// Retrieval and reranking defaults
pub mod retrieval {
    /// Candidates fetched from hybrid search before reranking
    pub const RETRIEVAL_TOP_K: usize = 30;

    /// Final results after reranking
    pub const RERANKER_TOP_N: usize = 5;

    /// Soft upper bound for a parent chunk, in characters. An Article that
    /// alone exceeds this becomes one oversized parent.
    pub const PARENT_CHUNK_SIZE: usize = 2000;

    /// Hard upper bound for a child chunk, in characters
    pub const CHILD_CHUNK_SIZE: usize = 512;

    /// Chunks shorter than this are merged into a neighbor
    pub const MIN_CHUNK_SIZE: usize = 100;

    /// Total character budget for the generation context window
    pub const CONTEXT_CHAR_BUDGET: usize = 12_000;

    /// Per-call timeout for the hybrid search boundary (ms)
    pub const SEARCH_TIMEOUT_MS: u64 = 5_000;

    /// Per-call timeout for the rerank boundary (ms)
    pub const RERANK_TIMEOUT_MS: u64 = 5_000;

    /// Backoff before the single search retry (ms)
    pub const SEARCH_RETRY_BACKOFF_MS: u64 = 200;
}

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Qdrant vector store endpoint
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6334";

    /// Gemini API base URL
    pub const GEMINI_DEFAULT: &str = "https://generativelanguage.googleapis.com/v1beta";
}

/// Model identifiers
pub mod models {
    /// Cross-encoder reranking model
    pub const RERANKER_MODEL: &str = "namdp-ptit/ViRanker";

    /// Generation model
    pub const LLM_MODEL: &str = "gemini-2.5-flash-lite";
}

/// Ingestion defaults
pub mod ingestion {
    /// Child chunks per upsert batch
    pub const BATCH_SIZE: usize = 100;

    /// Concurrent upsert batches in flight
    pub const MAX_CONCURRENT_BATCHES: usize = 4;
}
