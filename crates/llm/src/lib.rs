//! LLM integration
//!
//! Features:
//! - `LlmBackend` trait with blocking and streaming generation
//! - Gemini HTTP backend with SSE streaming and retry
//! - Vietnamese prompt templates for legal QA and query condensation

pub mod backend;
pub mod gemini;
pub mod prompt;

pub use backend::{FinishReason, GenerationResult, LlmBackend};
pub use gemini::{GeminiBackend, GeminiConfig};
pub use prompt::{
    build_condense_messages, build_qa_messages, Message, Role, CONTEXTUALIZE_PROMPT,
    NO_CONTEXT_ANSWER, QA_SYSTEM_PROMPT,
};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for legal_assistant_core::Error {
    fn from(err: LlmError) -> Self {
        legal_assistant_core::Error::GeneratorFailure(err.to_string())
    }
}
