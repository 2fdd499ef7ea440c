//! Retrieval orchestration
//!
//! One query goes through: encode (dense and sparse, on the blocking
//! pool) -> hybrid search with timeout and one retry -> parent
//! resolution -> parent fetch -> rerank. The result carries a degraded
//! flag so callers can tell a fully ranked answer from a fallback
//! ordering.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::embeddings::{DenseEmbedder, SparseEncoder, SparseVector};
use crate::parent_store::ParentStore;
use crate::reranker::{RerankedParent, Reranker};
use crate::resolver::{resolve_parents, ChildHit};
use crate::vector_store::HybridIndex;
use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Child hits requested from hybrid search
    pub top_k: usize,
    /// Search timeout per attempt (ms)
    pub search_timeout_ms: u64,
    /// Backoff before the single search retry (ms)
    pub retry_backoff_ms: u64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        use legal_assistant_config::constants::retrieval;
        Self {
            top_k: retrieval::RETRIEVAL_TOP_K,
            search_timeout_ms: retrieval::SEARCH_TIMEOUT_MS,
            retry_backoff_ms: retrieval::SEARCH_RETRY_BACKOFF_MS,
        }
    }
}

impl From<&legal_assistant_config::RetrievalConfig> for RetrieverConfig {
    fn from(config: &legal_assistant_config::RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            search_timeout_ms: config.search_timeout_ms,
            retry_backoff_ms:
                legal_assistant_config::constants::retrieval::SEARCH_RETRY_BACKOFF_MS,
        }
    }
}

/// Outcome of one retrieval run
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Reranked parents, best first
    pub parents: Vec<RerankedParent>,
    /// True when reranking fell back to the hybrid order
    pub degraded: bool,
    /// Child hits before parent resolution
    pub child_hits: usize,
    pub total_time_ms: u64,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// End-to-end retriever over the hybrid index and parent store
pub struct Retriever {
    embedder: Arc<dyn DenseEmbedder>,
    sparse_encoder: Arc<dyn SparseEncoder>,
    index: Arc<dyn HybridIndex>,
    parent_store: Arc<dyn ParentStore>,
    reranker: Reranker,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn DenseEmbedder>,
        sparse_encoder: Arc<dyn SparseEncoder>,
        index: Arc<dyn HybridIndex>,
        parent_store: Arc<dyn ParentStore>,
        reranker: Reranker,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embedder,
            sparse_encoder,
            index,
            parent_store,
            reranker,
            config,
        }
    }

    /// Retrieve reranked parent context for a query.
    ///
    /// An empty index yields an empty, non-degraded result. Search
    /// failures are retried once; a second failure propagates.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult, RagError> {
        let started = Instant::now();

        let (dense, sparse) = self.encode(query.to_string()).await?;
        let hits = self.search_with_retry(&dense, &sparse).await?;
        let hit_count = hits.len();

        if hits.is_empty() {
            debug!("hybrid search returned no hits");
            return Ok(RetrievalResult {
                parents: Vec::new(),
                degraded: false,
                child_hits: 0,
                total_time_ms: started.elapsed().as_millis() as u64,
            });
        }

        let candidates = resolve_parents(&hits);
        debug!(
            child_hits = hit_count,
            parents = candidates.len(),
            "resolved child hits to parents"
        );

        let ids: Vec<String> = candidates.iter().map(|c| c.parent_id.clone()).collect();
        let fetched = self.parent_store.get(&ids).await?;

        // Rejoin fetched parents with their candidate scores. Missing
        // parents were already logged by the store.
        let scores: std::collections::HashMap<&str, f32> = candidates
            .iter()
            .map(|c| (c.parent_id.as_str(), c.score))
            .collect();
        let scored: Vec<RerankedParent> = fetched
            .into_iter()
            .filter_map(|parent| {
                let score = *scores.get(parent.id.as_str())?;
                Some(RerankedParent { parent, score })
            })
            .collect();

        let (parents, degraded) = self.reranker.rerank(query, scored).await;

        let total_time_ms = started.elapsed().as_millis() as u64;
        info!(
            child_hits = hit_count,
            kept = parents.len(),
            degraded,
            total_time_ms,
            "retrieval complete"
        );

        Ok(RetrievalResult {
            parents,
            degraded,
            child_hits: hit_count,
            total_time_ms,
        })
    }

    /// Encode the query on the blocking pool; embedding is CPU-bound.
    async fn encode(&self, query: String) -> Result<(Vec<f32>, SparseVector), RagError> {
        let embedder = Arc::clone(&self.embedder);
        let sparse_encoder = Arc::clone(&self.sparse_encoder);

        tokio::task::spawn_blocking(move || {
            let dense = embedder.embed(&query)?;
            let sparse = sparse_encoder.encode(&query);
            Ok((dense, sparse))
        })
        .await
        .map_err(|e| RagError::Embedding(format!("embedding task failed: {}", e)))?
    }

    async fn search_with_retry(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
    ) -> Result<Vec<ChildHit>, RagError> {
        let timeout = Duration::from_millis(self.config.search_timeout_ms);

        match self.search_once(dense, sparse, timeout).await {
            Ok(hits) => Ok(hits),
            Err(e) => {
                warn!(error = %e, "hybrid search failed, retrying once");
                tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                self.search_once(dense, sparse, timeout).await
            }
        }
    }

    async fn search_once(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        timeout: Duration,
    ) -> Result<Vec<ChildHit>, RagError> {
        tokio::time::timeout(timeout, self.index.search(dense, sparse, self.config.top_k))
            .await
            .map_err(|_| {
                RagError::Search(format!(
                    "hybrid search timed out after {}ms",
                    timeout.as_millis()
                ))
            })?
    }
}
