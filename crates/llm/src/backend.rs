//! LLM backend trait
//!
//! Generation is a boundary call: the pipeline only depends on this
//! trait, never on a concrete provider. Streaming delivers fragments
//! over an mpsc channel; dropping the receiver cancels delivery.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::prompt::Message;
use crate::LlmError;

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated text (full text, also for streamed calls)
    pub text: String,
    /// Tokens generated, when the provider reports them
    pub tokens: usize,
    /// Total generation time (ms)
    pub total_time_ms: u64,
    /// Finish reason
    pub finish_reason: FinishReason,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Cancelled,
}

/// LLM backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a full response
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError>;

    /// Generate with streaming. Fragments are sent on `tx` as they
    /// arrive; the returned result carries the assembled text. A closed
    /// receiver stops delivery without error.
    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError>;

    /// Check if the backend is reachable
    async fn is_available(&self) -> bool;

    /// Model identifier
    fn model_name(&self) -> &str;
}
