//! Streaming answer chain
//!
//! Ties the pipeline together: condense the question, retrieve and
//! rerank context, emit citations, then stream generated tokens. The
//! citations event always precedes the first token so clients can
//! render sources while the answer is still generating.
//!
//! Dropping the stream cancels the in-flight generation task.

use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use legal_assistant_core::{ChatMessage, Citation};
use legal_assistant_llm::{
    build_qa_messages, FinishReason, GenerationResult, LlmBackend, LlmError, NO_CONTEXT_ANSWER,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::condenser::QueryCondenser;
use crate::reranker::RerankedParent;
use crate::retriever::Retriever;
use crate::sources::extract_citations;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
const TOKEN_CHANNEL_CAPACITY: usize = 64;

/// Event emitted while answering a question
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    /// Citations for the retrieved context; always the first event
    Sources(Vec<Citation>),
    /// One generated text fragment
    Token(String),
    /// Generation finished normally
    Done,
    /// The pipeline failed after the stream started
    Error(String),
}

/// Complete (non-streamed) answer
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    /// True when reranking fell back to the hybrid order
    pub degraded: bool,
}

/// Chain configuration
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Character budget for the generation context; lowest-ranked
    /// parents are dropped first when the budget is exceeded
    pub context_char_budget: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            context_char_budget:
                legal_assistant_config::constants::retrieval::CONTEXT_CHAR_BUDGET,
        }
    }
}

impl From<&legal_assistant_config::RetrievalConfig> for ChainConfig {
    fn from(config: &legal_assistant_config::RetrievalConfig) -> Self {
        Self {
            context_char_budget: config.context_char_budget,
        }
    }
}

/// Retrieval-augmented answer chain
#[derive(Clone)]
pub struct RagChain {
    condenser: Arc<QueryCondenser>,
    retriever: Arc<Retriever>,
    backend: Arc<dyn LlmBackend>,
    config: ChainConfig,
}

impl RagChain {
    pub fn new(
        condenser: Arc<QueryCondenser>,
        retriever: Arc<Retriever>,
        backend: Arc<dyn LlmBackend>,
        config: ChainConfig,
    ) -> Self {
        Self {
            condenser,
            retriever,
            backend,
            config,
        }
    }

    /// Answer a question, streaming events.
    ///
    /// Event order: one `Sources` (possibly empty), zero or more
    /// `Token`s, then `Done` or `Error`. An empty corpus produces the
    /// fixed no-context answer without calling the generator.
    pub fn answer_stream(
        &self,
        history: Vec<ChatMessage>,
        question: String,
    ) -> impl Stream<Item = AnswerEvent> + Send + 'static {
        let chain = self.clone();

        stream! {
            let request_id = Uuid::new_v4();
            debug!(%request_id, "answer stream started");

            let query = chain.condenser.condense(&history, &question).await;

            debug!(%request_id, query = %query, "retrieving context");
            let retrieval = match chain.retriever.retrieve(&query).await {
                Ok(retrieval) => retrieval,
                Err(e) => {
                    warn!(%request_id, error = %e, "retrieval failed");
                    yield AnswerEvent::Sources(Vec::new());
                    yield AnswerEvent::Error(e.to_string());
                    return;
                }
            };

            let citations = extract_citations(&retrieval.parents);
            yield AnswerEvent::Sources(citations);

            if retrieval.is_empty() {
                info!(%request_id, "no context found, answering with the fixed fallback");
                yield AnswerEvent::Token(NO_CONTEXT_ANSWER.to_string());
                yield AnswerEvent::Done;
                return;
            }

            debug!(
                %request_id,
                parents = retrieval.parents.len(),
                degraded = retrieval.degraded,
                "generating"
            );
            let context = build_context(&retrieval.parents, chain.config.context_char_budget);
            let messages = build_qa_messages(&context, &history, &question);

            let (tx, mut rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
            let backend = Arc::clone(&chain.backend);
            let mut guard = AbortOnDrop {
                handle: Some(tokio::spawn(async move {
                    backend.generate_stream(&messages, tx).await
                })),
                request_id,
            };

            while let Some(token) = rx.recv().await {
                yield AnswerEvent::Token(token);
            }

            let Some(handle) = guard.handle.take() else {
                return;
            };
            match handle.await {
                Ok(Ok(result)) => {
                    info!(
                        %request_id,
                        tokens = result.tokens,
                        total_time_ms = result.total_time_ms,
                        finish_reason = ?result.finish_reason,
                        "generation finished"
                    );
                    if result.finish_reason == FinishReason::Error {
                        yield AnswerEvent::Error("generation ended abnormally".to_string());
                    } else {
                        yield AnswerEvent::Done;
                    }
                }
                Ok(Err(e)) => {
                    warn!(%request_id, error = %e, "generation failed");
                    yield AnswerEvent::Error(e.to_string());
                }
                Err(e) => {
                    warn!(%request_id, error = %e, "generation task aborted");
                    yield AnswerEvent::Error("generation task aborted".to_string());
                }
            }
        }
    }

    /// Same chain with a different generator, for per-request overrides
    /// such as sampling temperature. Condensation keeps the default
    /// backend.
    pub fn with_backend(&self, backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            ..self.clone()
        }
    }

    /// Answer a question in one shot.
    pub async fn answer(
        &self,
        history: &[ChatMessage],
        question: &str,
    ) -> Result<Answer, legal_assistant_core::Error> {
        let query = self.condenser.condense(history, question).await;
        let retrieval = self.retriever.retrieve(&query).await?;

        let citations = extract_citations(&retrieval.parents);
        if retrieval.is_empty() {
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                citations,
                degraded: retrieval.degraded,
            });
        }

        let context = build_context(&retrieval.parents, self.config.context_char_budget);
        let messages = build_qa_messages(&context, history, question);
        let result: GenerationResult = self
            .backend
            .generate(&messages)
            .await
            .map_err(|e: LlmError| legal_assistant_core::Error::from(e))?;

        Ok(Answer {
            text: result.text,
            citations,
            degraded: retrieval.degraded,
        })
    }
}

/// Join parent texts into one context block within `budget` characters.
///
/// Parents are taken in rank order; when the budget runs out remaining
/// parents are dropped. A first parent that alone exceeds the budget is
/// truncated rather than dropped so the generator always sees some
/// context.
fn build_context(parents: &[RerankedParent], budget: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for parent in parents {
        let text = parent.parent.text.as_str();
        let len = text.chars().count();
        let separator = if context.is_empty() {
            0
        } else {
            CONTEXT_SEPARATOR.chars().count()
        };

        if used + separator + len > budget {
            if context.is_empty() {
                context.extend(text.chars().take(budget));
            }
            break;
        }

        if !context.is_empty() {
            context.push_str(CONTEXT_SEPARATOR);
        }
        context.push_str(text);
        used += separator + len;
    }

    context
}

/// Aborts the wrapped generation task when dropped before completion
struct AbortOnDrop<T> {
    handle: Option<JoinHandle<T>>,
    request_id: Uuid,
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(request_id = %self.request_id, "stream dropped, generation cancelled");
        }
    }
}
