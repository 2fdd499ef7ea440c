//! Shared application state
//!
//! Wires the pipeline once at startup: Qdrant index, parent store,
//! encoders, reranker, retriever, Gemini backend, answer chain and
//! ingestor. Handlers clone the state cheaply; everything inside is
//! behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use legal_assistant_config::Settings;
use legal_assistant_core::Error;
use legal_assistant_llm::{GeminiBackend, GeminiConfig, LlmBackend};
use legal_assistant_rag::{
    ChainConfig, CrossEncoder, EmbeddingConfig, HttpCrossEncoder, InMemoryParentStore, Ingestor,
    IngestorConfig, KeywordScorer, LegalTextSplitter, QdrantIndex, QdrantIndexConfig,
    QueryCondenser, RagChain, Reranker, RerankerConfig, Retriever, RetrieverConfig, SimpleEmbedder,
    SplitterConfig, TermFrequencyEncoder,
};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub chain: RagChain,
    pub ingestor: Arc<Ingestor>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Build the full pipeline from settings.
    ///
    /// Connects to Qdrant and creates the hybrid collection when it
    /// does not exist yet. Fails fast on a missing LLM API key or an
    /// unreachable vector store.
    pub async fn from_settings(settings: Settings) -> Result<Self, Error> {
        let index = Arc::new(QdrantIndex::connect(QdrantIndexConfig::from(
            &settings.qdrant,
        ))?);
        index.ensure_collection().await?;
        info!(
            collection = %settings.qdrant.collection,
            url = %settings.qdrant.url,
            "hybrid index ready"
        );

        let embedder = Arc::new(SimpleEmbedder::new(EmbeddingConfig {
            dim: settings.qdrant.vector_dim,
        }));
        let sparse_encoder = Arc::new(TermFrequencyEncoder::new());
        let parent_store = Arc::new(InMemoryParentStore::new());

        let backend: Arc<dyn LlmBackend> = Arc::new(GeminiBackend::new(
            GeminiConfig::from_settings(&settings.llm)?,
        )?);
        info!(model = %backend.model_name(), "generator ready");

        let reranker_config = RerankerConfig {
            top_n: settings.retrieval.top_n,
            timeout_ms: settings.retrieval.rerank_timeout_ms,
            enabled: settings.retrieval.reranking_enabled,
            ..RerankerConfig::default()
        };
        let scorer: Arc<dyn CrossEncoder> = match &settings.retrieval.reranker_endpoint {
            Some(endpoint) => {
                info!(%endpoint, "using remote cross-encoder");
                Arc::new(HttpCrossEncoder::new(
                    endpoint.clone(),
                    reranker_config.model_name.clone(),
                    Duration::from_millis(settings.retrieval.rerank_timeout_ms),
                )?)
            }
            None => Arc::new(KeywordScorer::new()),
        };
        let reranker = Reranker::new(scorer, reranker_config);

        let retriever = Arc::new(Retriever::new(
            embedder.clone(),
            sparse_encoder.clone(),
            index.clone(),
            parent_store.clone(),
            reranker,
            RetrieverConfig::from(&settings.retrieval),
        ));

        let chain = RagChain::new(
            Arc::new(QueryCondenser::new(backend.clone())),
            retriever,
            backend,
            ChainConfig::from(&settings.retrieval),
        );

        let ingestor = Arc::new(Ingestor::new(
            LegalTextSplitter::new(SplitterConfig::from(&settings.retrieval)),
            embedder,
            sparse_encoder,
            index,
            parent_store,
            IngestorConfig::from(&settings.ingestion),
        ));

        Ok(Self {
            chain,
            ingestor,
            settings: Arc::new(settings),
        })
    }

    /// Chain for one request, honoring an optional temperature
    /// override. Out-of-range values and backend rebuild failures fall
    /// back to the default chain.
    pub fn chain_for(&self, temperature: Option<f32>) -> RagChain {
        let Some(temperature) = temperature else {
            return self.chain.clone();
        };
        if !(0.0..=2.0).contains(&temperature) {
            warn!(temperature, "ignoring out-of-range temperature override");
            return self.chain.clone();
        }

        match GeminiConfig::from_settings(&self.settings.llm)
            .map(|config| config.with_temperature(temperature))
            .and_then(GeminiBackend::new)
        {
            Ok(backend) => self.chain.with_backend(Arc::new(backend)),
            Err(e) => {
                warn!(error = %e, "failed to apply temperature override");
                self.chain.clone()
            }
        }
    }
}
