//! Cross-encoder reranking with graceful degradation
//!
//! The reranker rescores parent candidates against the raw user query.
//! Cross-encoder outputs are logits; a sigmoid maps them to [0, 1] so
//! downstream consumers always see comparable relevance scores. The
//! reranked score replaces the hybrid score entirely.
//!
//! Reranking is an optimization, never a point of failure: on scorer
//! error or timeout the pipeline falls back to the hybrid order and
//! flags the result as degraded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::splitter::ParentChunk;
use crate::RagError;

/// Scores query/passage pairs jointly. Outputs are raw logits.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Score each passage against the query. Must return exactly one
    /// score per passage, in input order.
    async fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError>;

    fn model_name(&self) -> &str;
}

/// A parent with its current relevance score in [0, 1]
#[derive(Debug, Clone)]
pub struct RerankedParent {
    pub parent: ParentChunk,
    pub score: f32,
}

/// Reranker configuration
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Final candidate count
    pub top_n: usize,
    /// Scoring timeout; on expiry the hybrid order is kept
    pub timeout_ms: u64,
    /// Disabled reranking keeps the hybrid order without degradation
    pub enabled: bool,
    pub model_name: String,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        use legal_assistant_config::constants::{models, retrieval};
        Self {
            top_n: retrieval::RERANKER_TOP_N,
            timeout_ms: retrieval::RERANK_TIMEOUT_MS,
            enabled: true,
            model_name: models::RERANKER_MODEL.to_string(),
        }
    }
}

/// Parent-level reranker
pub struct Reranker {
    scorer: Arc<dyn CrossEncoder>,
    config: RerankerConfig,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn CrossEncoder>, config: RerankerConfig) -> Self {
        Self { scorer, config }
    }

    /// Rerank candidates for `query`.
    ///
    /// Input scores are hybrid scores; output scores are normalized
    /// cross-encoder scores, except on fallback where the hybrid order
    /// survives. Returns the top candidates and whether the result is
    /// degraded (fallback taken because scoring failed or timed out).
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankedParent>,
    ) -> (Vec<RerankedParent>, bool) {
        if candidates.is_empty() {
            return (candidates, false);
        }
        if !self.config.enabled {
            return (Self::fallback(candidates, self.config.top_n), false);
        }

        let passages: Vec<&str> = candidates.iter().map(|c| c.parent.text.as_str()).collect();
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let scores = match tokio::time::timeout(timeout, self.scorer.score_batch(query, &passages))
            .await
        {
            Ok(Ok(scores)) if scores.len() == candidates.len() => scores,
            Ok(Ok(scores)) => {
                warn!(
                    expected = candidates.len(),
                    got = scores.len(),
                    "cross-encoder returned wrong score count, keeping hybrid order"
                );
                return (Self::fallback(candidates, self.config.top_n), true);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "cross-encoder scoring failed, keeping hybrid order");
                return (Self::fallback(candidates, self.config.top_n), true);
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.timeout_ms,
                    "cross-encoder timed out, keeping hybrid order"
                );
                return (Self::fallback(candidates, self.config.top_n), true);
            }
        };

        let mut rescored: Vec<RerankedParent> = candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, logit)| RerankedParent {
                parent: candidate.parent,
                score: sigmoid(logit),
            })
            .collect();

        rescored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        dedup_by_parent(&mut rescored);
        rescored.truncate(self.config.top_n);

        debug!(
            model = self.scorer.model_name(),
            kept = rescored.len(),
            "reranking complete"
        );
        (rescored, false)
    }

    fn fallback(mut candidates: Vec<RerankedParent>, top_n: usize) -> Vec<RerankedParent> {
        candidates
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        dedup_by_parent(&mut candidates);
        candidates.truncate(top_n);
        candidates
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Keep the highest-scored entry per parent id. Upstream resolution
/// already deduplicates; this guards against scorers fed duplicates.
fn dedup_by_parent(candidates: &mut Vec<RerankedParent>) {
    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.parent.id.clone()));
}

/// Remote cross-encoder behind a rerank HTTP API
/// (text-embeddings-inference wire format)
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    endpoint: String,
    model_name: String,
}

#[derive(serde::Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [&'a str],
    raw_scores: bool,
}

#[derive(serde::Deserialize)]
struct RerankEntry {
    index: usize,
    score: f32,
}

impl HttpCrossEncoder {
    pub fn new(
        endpoint: impl Into<String>,
        model_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Reranker(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model_name: model_name.into(),
        })
    }

    /// Reorder scores from (index, score) entries into passage order.
    fn scores_in_order(entries: Vec<RerankEntry>, count: usize) -> Result<Vec<f32>, RagError> {
        let mut scores = vec![None; count];
        for entry in entries {
            if entry.index >= count {
                return Err(RagError::Reranker(format!(
                    "rerank response index {} out of range",
                    entry.index
                )));
            }
            scores[entry.index] = Some(entry.score);
        }
        scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.ok_or_else(|| RagError::Reranker(format!("missing score for {}", i))))
            .collect()
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
        let response = self
            .client
            .post(format!("{}/rerank", self.endpoint.trim_end_matches('/')))
            .json(&RerankRequest {
                query,
                texts: passages,
                raw_scores: true,
            })
            .send()
            .await
            .map_err(|e| RagError::Reranker(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RagError::Reranker(format!(
                "rerank API returned {}",
                response.status()
            )));
        }

        let entries: Vec<RerankEntry> = response
            .json()
            .await
            .map_err(|e| RagError::Reranker(format!("invalid rerank response: {}", e)))?;
        Self::scores_in_order(entries, passages.len())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Lexical overlap scorer
///
/// Stands in for a model-backed cross-encoder: scores by query-term
/// coverage of the passage, mapped to a logit so the sigmoid pipeline
/// applies unchanged.
#[derive(Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CrossEncoder for KeywordScorer {
    async fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
        use unicode_segmentation::UnicodeSegmentation;

        let query_terms: Vec<String> = query.unicode_words().map(|w| w.to_lowercase()).collect();
        if query_terms.is_empty() {
            return Ok(vec![0.0; passages.len()]);
        }

        Ok(passages
            .iter()
            .map(|passage| {
                let lower = passage.to_lowercase();
                let hits = query_terms.iter().filter(|t| lower.contains(*t)).count();
                let coverage = hits as f32 / query_terms.len() as f32;
                // Map coverage in [0, 1] onto a symmetric logit range.
                coverage * 8.0 - 4.0
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword-overlap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScorer(Vec<f32>);

    #[async_trait]
    impl CrossEncoder for FixedScorer {
        async fn score_batch(&self, _: &str, _: &[&str]) -> Result<Vec<f32>, RagError> {
            Ok(self.0.clone())
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl CrossEncoder for FailingScorer {
        async fn score_batch(&self, _: &str, _: &[&str]) -> Result<Vec<f32>, RagError> {
            Err(RagError::Reranker("model unavailable".into()))
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct SlowScorer;

    #[async_trait]
    impl CrossEncoder for SlowScorer {
        async fn score_batch(&self, _: &str, passages: &[&str]) -> Result<Vec<f32>, RagError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![0.0; passages.len()])
        }
        fn model_name(&self) -> &str {
            "slow"
        }
    }

    fn candidate(id: &str, score: f32) -> RerankedParent {
        RerankedParent {
            parent: ParentChunk {
                id: id.to_string(),
                text: format!("văn bản {}", id),
                source_document_id: "doc".to_string(),
                structural_path: Vec::new(),
            },
            score,
        }
    }

    fn config(top_n: usize) -> RerankerConfig {
        RerankerConfig {
            top_n,
            timeout_ms: 100,
            enabled: true,
            model_name: "fixed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rerank_replaces_scores_and_sorts() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![-2.0, 3.0, 0.0])), config(3));
        let input = vec![candidate("a", 0.9), candidate("b", 0.5), candidate("c", 0.1)];

        let (out, degraded) = reranker.rerank("câu hỏi", input).await;
        assert!(!degraded);
        let order: Vec<_> = out.iter().map(|c| c.parent.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        for c in &out {
            assert!(c.score > 0.0 && c.score < 1.0);
        }
        // Sigmoid of 3.0 is well above 0.9.
        assert!(out[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_equal_scores_preserve_input_order() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![1.0, 1.0, 1.0])), config(3));
        let input = vec![candidate("a", 0.1), candidate("b", 0.9), candidate("c", 0.5)];

        let (out, degraded) = reranker.rerank("q", input).await;
        assert!(!degraded);
        // Ties keep the pre-rerank relative order.
        let order: Vec<_> = out.iter().map(|c| c.parent.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_truncates_to_top_n() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![1.0, 2.0, 3.0, 4.0])), config(2));
        let input = (0..4).map(|i| candidate(&format!("p{}", i), 0.5)).collect();

        let (out, _) = reranker.rerank("q", input).await;
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_scorer_failure_degrades_to_hybrid_order() {
        let reranker = Reranker::new(Arc::new(FailingScorer), config(2));
        let input = vec![candidate("a", 0.2), candidate("b", 0.9), candidate("c", 0.5)];

        let (out, degraded) = reranker.rerank("q", input).await;
        assert!(degraded);
        let order: Vec<_> = out.iter().map(|c| c.parent.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c"]);
        // Hybrid scores survive on fallback.
        assert_eq!(out[0].score, 0.9);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_hybrid_order() {
        let reranker = Reranker::new(Arc::new(SlowScorer), config(5));
        let input = vec![candidate("a", 0.4), candidate("b", 0.6)];

        let (out, degraded) = reranker.rerank("q", input).await;
        assert!(degraded);
        assert_eq!(out[0].parent.id, "b");
    }

    #[tokio::test]
    async fn test_disabled_keeps_hybrid_order_without_degradation() {
        let mut cfg = config(5);
        cfg.enabled = false;
        let reranker = Reranker::new(Arc::new(FailingScorer), cfg);
        let input = vec![candidate("a", 0.4), candidate("b", 0.6)];

        let (out, degraded) = reranker.rerank("q", input).await;
        assert!(!degraded);
        assert_eq!(out[0].parent.id, "b");
    }

    #[tokio::test]
    async fn test_wrong_score_count_degrades() {
        let reranker = Reranker::new(Arc::new(FixedScorer(vec![1.0])), config(5));
        let input = vec![candidate("a", 0.4), candidate("b", 0.6)];

        let (out, degraded) = reranker.rerank("q", input).await;
        assert!(degraded);
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_keyword_scorer_prefers_matching_passage() {
        let scorer = KeywordScorer::new();
        let scores = scorer
            .score_batch(
                "vượt đèn đỏ",
                &["phạt tiền khi vượt đèn đỏ", "quy định về nồng độ cồn"],
            )
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_http_scores_reordered_by_index() {
        let entries = vec![
            RerankEntry { index: 2, score: 0.1 },
            RerankEntry { index: 0, score: 0.9 },
            RerankEntry { index: 1, score: 0.5 },
        ];
        let scores = HttpCrossEncoder::scores_in_order(entries, 3).unwrap();
        assert_eq!(scores, vec![0.9, 0.5, 0.1]);
    }

    #[test]
    fn test_http_scores_reject_bad_indices() {
        let entries = vec![RerankEntry { index: 5, score: 0.1 }];
        assert!(HttpCrossEncoder::scores_in_order(entries, 2).is_err());

        let entries = vec![RerankEntry { index: 0, score: 0.1 }];
        assert!(HttpCrossEncoder::scores_in_order(entries, 2).is_err());
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert!(sigmoid(-10.0) < 0.001);
        assert!(sigmoid(10.0) > 0.999);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    }
}
