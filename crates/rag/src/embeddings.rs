//! Query and document embedding
//!
//! Two encoders feed the hybrid index: a dense embedder producing a
//! fixed-dimension vector and a sparse encoder producing term weights.
//! Both are synchronous and CPU-bound; callers run them on the blocking
//! pool. The default implementations are feature-hashing encoders that
//! need no model files, keeping the pipeline runnable without a GPU or
//! downloaded weights. Swap in a model-backed embedder behind the same
//! traits for production quality.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::RagError;

/// Sparse vector in index/value form, as Qdrant expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Dense embedder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Output dimension; must match the collection's dense vector size
    pub dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dim: 1024 }
    }
}

/// Dense text embedding
pub trait DenseEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    fn dim(&self) -> usize;
}

/// Sparse (lexical) text encoding
pub trait SparseEncoder: Send + Sync {
    fn encode(&self, text: &str) -> SparseVector;
}

/// Feature-hashing dense embedder
///
/// Hashes word unigrams and bigrams into `dim` buckets with signed
/// counts, then L2-normalizes. Deterministic and dependency-free.
pub struct SimpleEmbedder {
    config: EmbeddingConfig,
}

impl SimpleEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }
}

impl DenseEmbedder for SimpleEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let dim = self.config.dim;
        if dim == 0 {
            return Err(RagError::Embedding("embedding dim must be non-zero".into()));
        }
        let mut vector = vec![0.0f32; dim];

        let words: Vec<String> = tokenize(text);
        for window in 1..=2usize {
            for gram in words.windows(window) {
                let token = gram.join(" ");
                let h = hash_token(&token);
                let bucket = (h % dim as u64) as usize;
                let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
                vector[bucket] += sign;
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dim(&self) -> usize {
        self.config.dim
    }
}

/// Hashed term-frequency sparse encoder with sublinear weighting
#[derive(Default)]
pub struct TermFrequencyEncoder;

impl TermFrequencyEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl SparseEncoder for TermFrequencyEncoder {
    fn encode(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for word in tokenize(text) {
            let index = (hash_token(&word) & 0x7fff_ffff) as u32;
            *counts.entry(index).or_insert(0.0) += 1.0;
        }

        let mut entries: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(index, count)| (index, 1.0 + count.ln()))
            .collect();
        entries.sort_unstable_by_key(|(index, _)| *index);

        SparseVector {
            indices: entries.iter().map(|(i, _)| *i).collect(),
            values: entries.iter().map(|(_, v)| *v).collect(),
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn hash_token(token: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish()
}
