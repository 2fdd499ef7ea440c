//! History-aware query condensation
//!
//! Follow-up questions ("thế còn xe máy thì sao?") are meaningless as
//! search queries on their own. The condenser rewrites the latest
//! question into a standalone one using the conversation history.
//! Condensation is best-effort: any failure falls back to the raw
//! question so retrieval always has something to run with.

use std::sync::Arc;

use legal_assistant_core::ChatMessage;
use legal_assistant_llm::{build_condense_messages, LlmBackend};
use tracing::{debug, warn};

/// Rewrites follow-up questions into standalone search queries
pub struct QueryCondenser {
    backend: Arc<dyn LlmBackend>,
}

impl QueryCondenser {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Condense `question` against `history`.
    ///
    /// Empty history passes the question through untouched. On backend
    /// failure or an empty rewrite the raw question is returned.
    pub async fn condense(&self, history: &[ChatMessage], question: &str) -> String {
        if history.is_empty() {
            return question.to_string();
        }

        let messages = build_condense_messages(history, question);
        match self.backend.generate(&messages).await {
            Ok(result) => {
                let rewritten = result.text.trim();
                if rewritten.is_empty() {
                    warn!("condenser returned empty rewrite, using raw question");
                    question.to_string()
                } else {
                    debug!(original = %question, rewritten = %rewritten, "condensed query");
                    rewritten.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "query condensation failed, using raw question");
                question.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use legal_assistant_llm::{FinishReason, GenerationResult, LlmError, Message};
    use tokio::sync::mpsc;

    struct FixedBackend(Result<String, ()>);

    #[async_trait]
    impl LlmBackend for FixedBackend {
        async fn generate(&self, _: &[Message]) -> Result<GenerationResult, LlmError> {
            match &self.0 {
                Ok(text) => Ok(GenerationResult {
                    text: text.clone(),
                    tokens: 0,
                    total_time_ms: 1,
                    finish_reason: FinishReason::Stop,
                }),
                Err(_) => Err(LlmError::Generation("down".into())),
            }
        }
        async fn generate_stream(
            &self,
            messages: &[Message],
            _: mpsc::Sender<String>,
        ) -> Result<GenerationResult, LlmError> {
            self.generate(messages).await
        }
        async fn is_available(&self) -> bool {
            true
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_empty_history_passes_question_through() {
        let condenser = QueryCondenser::new(Arc::new(FixedBackend(Ok("REWRITTEN".into()))));
        let out = condenser.condense(&[], "mức phạt vượt đèn đỏ?").await;
        assert_eq!(out, "mức phạt vượt đèn đỏ?");
    }

    #[tokio::test]
    async fn test_history_triggers_rewrite() {
        let condenser = QueryCondenser::new(Arc::new(FixedBackend(Ok(
            "mức phạt vượt đèn đỏ đối với xe máy".into(),
        ))));
        let history = vec![
            ChatMessage::user("mức phạt vượt đèn đỏ?"),
            ChatMessage::assistant("Theo Nghị định 100..."),
        ];
        let out = condenser.condense(&history, "thế còn xe máy?").await;
        assert_eq!(out, "mức phạt vượt đèn đỏ đối với xe máy");
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_raw_question() {
        let condenser = QueryCondenser::new(Arc::new(FixedBackend(Err(()))));
        let history = vec![ChatMessage::user("câu hỏi trước")];
        let out = condenser.condense(&history, "thế còn xe máy?").await;
        assert_eq!(out, "thế còn xe máy?");
    }

    #[tokio::test]
    async fn test_empty_rewrite_falls_back() {
        let condenser = QueryCondenser::new(Arc::new(FixedBackend(Ok("   ".into()))));
        let history = vec![ChatMessage::user("câu hỏi trước")];
        let out = condenser.condense(&history, "thế còn xe máy?").await;
        assert_eq!(out, "thế còn xe máy?");
    }
}
