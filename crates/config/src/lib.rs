//! Configuration management for the legal assistant
//!
//! Supports loading configuration from:
//! - YAML files (config/default.yaml, config/{env}.yaml)
//! - Environment variables (LEGAL_ASSISTANT_ prefix, `__` separator)
//!
//! Retrieval defaults live in the [`constants`] module so tuned values are
//! defined in exactly one place.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, IngestionConfig, LlmConfig, QdrantConfig, RetrievalConfig, ServerConfig,
    Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
