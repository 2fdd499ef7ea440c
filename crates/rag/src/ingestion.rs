//! Document ingestion
//!
//! Splits raw documents, stores parents, embeds children and upserts
//! them into the hybrid index in concurrent batches. One ingestion run
//! at a time; progress is observable while a run is active so HTTP
//! callers can poll it.
//!
//! Malformed documents are skipped and recorded, never fatal: one bad
//! scan must not abort a corpus load.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embeddings::{DenseEmbedder, SparseEncoder};
use crate::parent_store::ParentStore;
use crate::splitter::{LegalTextSplitter, ParentSplit};
use crate::vector_store::{ChildPoint, HybridIndex};
use crate::RagError;

/// A document submitted for ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    /// Stable document id, e.g. `nd-100-2019`
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
}

/// Snapshot of an ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestProgress {
    pub running: bool,
    pub documents_total: usize,
    pub documents_done: usize,
    pub parents_stored: usize,
    pub children_indexed: usize,
    pub errors: Vec<String>,
}

/// Final report of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub documents: usize,
    pub documents_skipped: usize,
    pub parents_stored: usize,
    pub children_indexed: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Default)]
struct ProgressState {
    running: AtomicBool,
    documents_total: AtomicUsize,
    documents_done: AtomicUsize,
    parents_stored: AtomicUsize,
    children_indexed: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl ProgressState {
    fn reset(&self, total: usize) {
        self.documents_total.store(total, Ordering::Relaxed);
        self.documents_done.store(0, Ordering::Relaxed);
        self.parents_stored.store(0, Ordering::Relaxed);
        self.children_indexed.store(0, Ordering::Relaxed);
        self.errors.lock().clear();
    }

    fn record_error(&self, message: String) {
        warn!(%message, "ingestion error");
        self.errors.lock().push(message);
    }

    fn snapshot(&self) -> IngestProgress {
        IngestProgress {
            running: self.running.load(Ordering::Relaxed),
            documents_total: self.documents_total.load(Ordering::Relaxed),
            documents_done: self.documents_done.load(Ordering::Relaxed),
            parents_stored: self.parents_stored.load(Ordering::Relaxed),
            children_indexed: self.children_indexed.load(Ordering::Relaxed),
            errors: self.errors.lock().clone(),
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Child points per upsert batch
    pub batch_size: usize,
    /// Concurrent upsert batches
    pub max_concurrent_batches: usize,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        use legal_assistant_config::constants::ingestion;
        Self {
            batch_size: ingestion::BATCH_SIZE,
            max_concurrent_batches: ingestion::MAX_CONCURRENT_BATCHES,
        }
    }
}

impl From<&legal_assistant_config::IngestionConfig> for IngestorConfig {
    fn from(config: &legal_assistant_config::IngestionConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrent_batches: config.max_concurrent_batches,
        }
    }
}

/// Corpus ingestor
pub struct Ingestor {
    splitter: Arc<LegalTextSplitter>,
    embedder: Arc<dyn DenseEmbedder>,
    sparse_encoder: Arc<dyn SparseEncoder>,
    index: Arc<dyn HybridIndex>,
    parent_store: Arc<dyn ParentStore>,
    config: IngestorConfig,
    progress: Arc<ProgressState>,
}

impl Ingestor {
    pub fn new(
        splitter: LegalTextSplitter,
        embedder: Arc<dyn DenseEmbedder>,
        sparse_encoder: Arc<dyn SparseEncoder>,
        index: Arc<dyn HybridIndex>,
        parent_store: Arc<dyn ParentStore>,
        config: IngestorConfig,
    ) -> Self {
        Self {
            splitter: Arc::new(splitter),
            embedder,
            sparse_encoder,
            index,
            parent_store,
            config,
            progress: Arc::new(ProgressState::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.progress.running.load(Ordering::Relaxed)
    }

    pub fn progress(&self) -> IngestProgress {
        self.progress.snapshot()
    }

    /// Reserve the single ingestion slot. Returns false when a run is
    /// already active. A successful reservation must be followed by
    /// `ingest_reserved`, which releases the slot on completion.
    pub fn try_start(&self) -> bool {
        self.progress
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Ingest a batch of documents.
    ///
    /// Only one run may be active at a time; a concurrent call fails
    /// immediately. Re-ingesting a document id replaces its previous
    /// parents and child points.
    pub async fn ingest(&self, documents: Vec<RawDocument>) -> Result<IngestReport, RagError> {
        if !self.try_start() {
            return Err(RagError::Ingestion(
                "an ingestion run is already in progress".to_string(),
            ));
        }
        self.ingest_reserved(documents).await
    }

    /// Run an ingestion whose slot was already reserved via `try_start`.
    pub async fn ingest_reserved(
        &self,
        documents: Vec<RawDocument>,
    ) -> Result<IngestReport, RagError> {
        self.progress.reset(documents.len());
        let result = self.run(documents).await;
        self.progress.running.store(false, Ordering::SeqCst);

        let report = result?;
        info!(
            documents = report.documents,
            skipped = report.documents_skipped,
            parents = report.parents_stored,
            children = report.children_indexed,
            duration_ms = report.duration_ms,
            "ingestion complete"
        );
        Ok(report)
    }

    async fn run(&self, documents: Vec<RawDocument>) -> Result<IngestReport, RagError> {
        let started = Instant::now();
        let total = documents.len();
        let mut skipped = 0usize;

        for document in documents {
            match self.ingest_document(&document).await {
                Ok(()) => {}
                Err(RagError::Ingestion(reason)) => {
                    skipped += 1;
                    self.progress
                        .record_error(format!("{}: {}", document.id, reason));
                }
                Err(e) => return Err(e),
            }
            self.progress.documents_done.fetch_add(1, Ordering::Relaxed);
        }

        Ok(IngestReport {
            documents: total - skipped,
            documents_skipped: skipped,
            parents_stored: self.progress.parents_stored.load(Ordering::Relaxed),
            children_indexed: self.progress.children_indexed.load(Ordering::Relaxed),
            errors: self.progress.errors.lock().clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn ingest_document(&self, document: &RawDocument) -> Result<(), RagError> {
        if document.id.trim().is_empty() {
            return Err(RagError::Ingestion("empty document id".to_string()));
        }
        if document.text.trim().is_empty() {
            return Err(RagError::Ingestion("empty document text".to_string()));
        }

        // Replace any earlier version of this document.
        self.parent_store.remove_document(&document.id).await?;
        self.index.delete_document(&document.id).await?;

        let splits = self.split_and_embed(document.clone()).await?;
        if splits.is_empty() {
            return Err(RagError::Ingestion("no chunks produced".to_string()));
        }

        let parents: Vec<_> = splits.iter().map(|(split, _)| split.parent.clone()).collect();
        let parent_count = parents.len();
        self.parent_store.put(parents).await?;
        self.progress
            .parents_stored
            .fetch_add(parent_count, Ordering::Relaxed);

        let points: Vec<ChildPoint> = splits.into_iter().flat_map(|(_, points)| points).collect();
        let child_count = points.len();

        let batches: Vec<Vec<ChildPoint>> = points
            .chunks(self.config.batch_size.max(1))
            .map(|b| b.to_vec())
            .collect();

        let mut upserts = stream::iter(batches.into_iter().map(|batch| {
            let index = Arc::clone(&self.index);
            async move { index.upsert(batch).await }
        }))
        .buffer_unordered(self.config.max_concurrent_batches.max(1));

        while let Some(result) = upserts.next().await {
            result?;
        }

        self.progress
            .children_indexed
            .fetch_add(child_count, Ordering::Relaxed);
        Ok(())
    }

    /// Split and embed one document on the blocking pool.
    async fn split_and_embed(
        &self,
        document: RawDocument,
    ) -> Result<Vec<(ParentSplit, Vec<ChildPoint>)>, RagError> {
        let splitter = Arc::clone(&self.splitter);
        let embedder = Arc::clone(&self.embedder);
        let sparse_encoder = Arc::clone(&self.sparse_encoder);

        tokio::task::spawn_blocking(move || {
            let splits = splitter.split(&document.id, &document.text);
            splits
                .into_iter()
                .map(|split| {
                    let points = split
                        .children
                        .iter()
                        .map(|child| {
                            Ok(ChildPoint {
                                id: child.id.clone(),
                                parent_id: child.parent_id.clone(),
                                document_id: document.id.clone(),
                                text: child.text.clone(),
                                title: document.title.clone(),
                                law_id: Some(document.id.clone()),
                                dense: embedder.embed(&child.text)?,
                                sparse: sparse_encoder.encode(&child.text),
                            })
                        })
                        .collect::<Result<Vec<_>, RagError>>()?;
                    Ok((split, points))
                })
                .collect::<Result<Vec<_>, RagError>>()
        })
        .await
        .map_err(|e| RagError::Ingestion(format!("split task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingConfig, SimpleEmbedder, SparseVector, TermFrequencyEncoder};
    use crate::parent_store::{InMemoryParentStore, ParentStore};
    use crate::resolver::ChildHit;
    use crate::splitter::SplitterConfig;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingIndex {
        points: Mutex<Vec<ChildPoint>>,
    }

    #[async_trait]
    impl HybridIndex for RecordingIndex {
        async fn upsert(&self, points: Vec<ChildPoint>) -> Result<(), RagError> {
            self.points.lock().extend(points);
            Ok(())
        }
        async fn search(
            &self,
            _: &[f32],
            _: &SparseVector,
            _: usize,
        ) -> Result<Vec<ChildHit>, RagError> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<usize, RagError> {
            Ok(self.points.lock().len())
        }
        async fn delete_document(&self, document_id: &str) -> Result<(), RagError> {
            self.points.lock().retain(|p| p.document_id != document_id);
            Ok(())
        }
    }

    fn ingestor(
        index: Arc<RecordingIndex>,
        store: Arc<InMemoryParentStore>,
    ) -> Ingestor {
        Ingestor::new(
            LegalTextSplitter::new(SplitterConfig {
                parent_chunk_size: 300,
                child_chunk_size: 150,
                min_chunk_size: 20,
            }),
            Arc::new(SimpleEmbedder::new(EmbeddingConfig { dim: 16 })),
            Arc::new(TermFrequencyEncoder::new()),
            index,
            store,
            IngestorConfig {
                batch_size: 2,
                max_concurrent_batches: 2,
            },
        )
    }

    fn doc(id: &str, text: &str) -> RawDocument {
        RawDocument {
            id: id.to_string(),
            title: Some("Nghị định thử nghiệm".to_string()),
            text: text.to_string(),
        }
    }

    const SAMPLE: &str = "Điều 1. Phạm vi điều chỉnh\n\
        1. Nghị định này quy định về xử phạt vi phạm hành chính trong lĩnh vực giao thông.\n\
        Điều 2. Đối tượng áp dụng\n\
        1. Cá nhân, tổ chức có hành vi vi phạm hành chính trong lĩnh vực giao thông đường bộ.\n";

    #[tokio::test]
    async fn test_ingest_stores_parents_and_children() {
        let index = Arc::new(RecordingIndex::default());
        let store = Arc::new(InMemoryParentStore::new());
        let ingestor = ingestor(index.clone(), store.clone());

        let report = ingestor.ingest(vec![doc("nd-1", SAMPLE)]).await.unwrap();

        assert_eq!(report.documents, 1);
        assert_eq!(report.documents_skipped, 0);
        assert!(report.parents_stored > 0);
        assert!(report.children_indexed > 0);
        assert_eq!(store.len().await.unwrap(), report.parents_stored);
        assert_eq!(index.points.lock().len(), report.children_indexed);

        // Every indexed child references a stored parent.
        for point in index.points.lock().iter() {
            let parents = store.get(&[point.parent_id.clone()]).await.unwrap();
            assert_eq!(parents.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_malformed_documents_are_skipped_not_fatal() {
        let index = Arc::new(RecordingIndex::default());
        let store = Arc::new(InMemoryParentStore::new());
        let ingestor = ingestor(index, store);

        let report = ingestor
            .ingest(vec![doc("", SAMPLE), doc("nd-2", "   "), doc("nd-3", SAMPLE)])
            .await
            .unwrap();

        assert_eq!(report.documents, 1);
        assert_eq!(report.documents_skipped, 2);
        assert_eq!(report.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_reingest_replaces_previous_version() {
        let index = Arc::new(RecordingIndex::default());
        let store = Arc::new(InMemoryParentStore::new());
        let ingestor = ingestor(index.clone(), store.clone());

        ingestor.ingest(vec![doc("nd-1", SAMPLE)]).await.unwrap();
        let first_children = index.points.lock().len();

        ingestor.ingest(vec![doc("nd-1", SAMPLE)]).await.unwrap();
        assert_eq!(index.points.lock().len(), first_children);
    }

    #[tokio::test]
    async fn test_try_start_reserves_the_single_slot() {
        let index = Arc::new(RecordingIndex::default());
        let store = Arc::new(InMemoryParentStore::new());
        let ingestor = ingestor(index, store);

        assert!(ingestor.try_start());
        assert!(ingestor.is_running());
        // The reservation blocks both a second reservation and ingest().
        assert!(!ingestor.try_start());
        let err = ingestor.ingest(vec![doc("nd-1", SAMPLE)]).await.unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));

        // The reserved run releases the slot when it completes.
        let report = ingestor.ingest_reserved(vec![doc("nd-1", SAMPLE)]).await.unwrap();
        assert_eq!(report.documents, 1);
        assert!(!ingestor.is_running());
        assert!(ingestor.try_start());
    }

    #[tokio::test]
    async fn test_progress_reflects_completed_run() {
        let index = Arc::new(RecordingIndex::default());
        let store = Arc::new(InMemoryParentStore::new());
        let ingestor = ingestor(index, store);

        ingestor.ingest(vec![doc("nd-1", SAMPLE)]).await.unwrap();

        let progress = ingestor.progress();
        assert!(!progress.running);
        assert_eq!(progress.documents_total, 1);
        assert_eq!(progress.documents_done, 1);
        assert!(progress.children_indexed > 0);
    }
}
