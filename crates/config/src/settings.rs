//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, ingestion, models, retrieval};
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Qdrant connection configuration
    #[serde(default)]
    pub qdrant: QdrantConfig,

    /// Retrieval pipeline configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Ingestion configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty means localhost only
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Qdrant connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Dense vector dimension; must match the embedding model
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_qdrant_url() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}

fn default_collection() -> String {
    "legal_hybrid_v3".to_string()
}

fn default_vector_dim() -> usize {
    1024
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            vector_dim: default_vector_dim(),
            api_key: None,
        }
    }
}

/// Retrieval pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched from hybrid search before reranking
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Final results after reranking
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Soft parent chunk size in characters
    #[serde(default = "default_parent_chunk_size")]
    pub parent_chunk_size: usize,
    /// Hard child chunk size in characters
    #[serde(default = "default_child_chunk_size")]
    pub child_chunk_size: usize,
    /// Character budget for the generation context
    #[serde(default = "default_context_budget")]
    pub context_char_budget: usize,
    /// Enable cross-encoder reranking
    #[serde(default = "default_true")]
    pub reranking_enabled: bool,
    /// Rerank API endpoint; unset falls back to the local keyword scorer
    #[serde(default)]
    pub reranker_endpoint: Option<String>,
    /// Hybrid search timeout (ms)
    #[serde(default = "default_search_timeout")]
    pub search_timeout_ms: u64,
    /// Rerank timeout (ms); a timeout degrades to the pre-rerank order
    #[serde(default = "default_rerank_timeout")]
    pub rerank_timeout_ms: u64,
}

fn default_top_k() -> usize {
    retrieval::RETRIEVAL_TOP_K
}

fn default_top_n() -> usize {
    retrieval::RERANKER_TOP_N
}

fn default_parent_chunk_size() -> usize {
    retrieval::PARENT_CHUNK_SIZE
}

fn default_child_chunk_size() -> usize {
    retrieval::CHILD_CHUNK_SIZE
}

fn default_context_budget() -> usize {
    retrieval::CONTEXT_CHAR_BUDGET
}

fn default_true() -> bool {
    true
}

fn default_search_timeout() -> u64 {
    retrieval::SEARCH_TIMEOUT_MS
}

fn default_rerank_timeout() -> u64 {
    retrieval::RERANK_TIMEOUT_MS
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_n: default_top_n(),
            parent_chunk_size: default_parent_chunk_size(),
            child_chunk_size: default_child_chunk_size(),
            context_char_budget: default_context_budget(),
            reranking_enabled: true,
            reranker_endpoint: None,
            search_timeout_ms: default_search_timeout(),
            rerank_timeout_ms: default_rerank_timeout(),
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the API key. The key
    /// itself never appears in config files.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_llm_model() -> String {
    models::LLM_MODEL.to_string()
}

fn default_llm_endpoint() -> String {
    endpoints::GEMINI_DEFAULT.to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> usize {
    2048
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Child chunks per upsert batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent upsert batches
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_batches: usize,
}

fn default_batch_size() -> usize {
    ingestion::BATCH_SIZE
}

fn default_max_concurrent() -> usize {
    ingestion::MAX_CONCURRENT_BATCHES
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent(),
        }
    }
}

impl Settings {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.top_n > self.retrieval.top_k {
            return Err(ConfigError::Validation(format!(
                "top_n ({}) must not exceed top_k ({})",
                self.retrieval.top_n, self.retrieval.top_k
            )));
        }
        if self.retrieval.child_chunk_size > self.retrieval.parent_chunk_size {
            return Err(ConfigError::Validation(format!(
                "child_chunk_size ({}) must not exceed parent_chunk_size ({})",
                self.retrieval.child_chunk_size, self.retrieval.parent_chunk_size
            )));
        }
        if self.retrieval.parent_chunk_size == 0 || self.retrieval.child_chunk_size == 0 {
            return Err(ConfigError::Validation(
                "chunk sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings with layered priority:
/// 1. Environment variables (LEGAL_ASSISTANT__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("LEGAL_ASSISTANT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.retrieval.top_k, 30);
        assert_eq!(settings.retrieval.top_n, 5);
        assert_eq!(settings.retrieval.parent_chunk_size, 2000);
        assert_eq!(settings.retrieval.child_chunk_size, 512);
    }

    #[test]
    fn test_validation_top_n_exceeds_top_k() {
        let mut settings = Settings::default();
        settings.retrieval.top_n = 50;
        assert!(settings.validate().is_err());

        settings.retrieval.top_n = 5;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_chunk_sizes() {
        let mut settings = Settings::default();
        settings.retrieval.child_chunk_size = 4000;
        assert!(settings.validate().is_err());
    }
}
