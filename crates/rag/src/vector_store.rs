//! Hybrid child-chunk index backed by Qdrant
//!
//! Each point carries two named vectors, a dense embedding and a sparse
//! term-weight vector. Search runs both branches server-side and fuses
//! them with reciprocal rank fusion, so the pipeline never has to merge
//! result lists client-side. Only child chunks are indexed; the payload
//! links every point back to its parent id.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder,
    Distance, Filter, Fusion, NamedVectors, PointStruct, PrefetchQueryBuilder, Query,
    QueryPointsBuilder, ScoredPoint, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
    UpsertPointsBuilder, Value, Vector, VectorInput, VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

use crate::embeddings::SparseVector;
use crate::resolver::ChildHit;
use crate::RagError;

const DENSE_VECTOR: &str = "dense";
const SPARSE_VECTOR: &str = "sparse";

mod payload_keys {
    pub const PARENT_ID: &str = "parent_id";
    pub const DOCUMENT_ID: &str = "document_id";
    pub const TEXT: &str = "text";
    pub const TITLE: &str = "title";
    pub const LAW_ID: &str = "law_id";
}

/// A child chunk ready for indexing, with both vectors attached
#[derive(Debug, Clone)]
pub struct ChildPoint {
    /// Point id; must be a UUID for Qdrant
    pub id: String,
    pub parent_id: String,
    pub document_id: String,
    pub text: String,
    pub title: Option<String>,
    pub law_id: Option<String>,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

/// Hybrid dense+sparse index over child chunks
#[async_trait]
pub trait HybridIndex: Send + Sync {
    async fn upsert(&self, points: Vec<ChildPoint>) -> Result<(), RagError>;

    /// Fused dense+sparse search returning up to `limit` child hits,
    /// best first
    async fn search(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ChildHit>, RagError>;

    /// Number of indexed child chunks
    async fn count(&self) -> Result<usize, RagError>;

    /// Drop every point belonging to a document
    async fn delete_document(&self, document_id: &str) -> Result<(), RagError>;
}

/// Qdrant index configuration
#[derive(Debug, Clone)]
pub struct QdrantIndexConfig {
    pub url: String,
    pub collection: String,
    pub vector_dim: usize,
    pub api_key: Option<String>,
}

impl From<&legal_assistant_config::QdrantConfig> for QdrantIndexConfig {
    fn from(config: &legal_assistant_config::QdrantConfig) -> Self {
        Self {
            url: config.url.clone(),
            collection: config.collection.clone(),
            vector_dim: config.vector_dim,
            api_key: config.api_key.clone(),
        }
    }
}

/// Qdrant-backed hybrid index
pub struct QdrantIndex {
    client: Qdrant,
    config: QdrantIndexConfig,
}

impl QdrantIndex {
    pub fn connect(config: QdrantIndexConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create the collection with named dense and sparse vectors if it
    /// does not exist yet
    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        if exists {
            return Ok(());
        }

        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(
            DENSE_VECTOR,
            VectorParamsBuilder::new(self.config.vector_dim as u64, Distance::Cosine),
        );

        let mut sparse_vectors = SparseVectorsConfigBuilder::default();
        sparse_vectors.add_named_vector_params(SPARSE_VECTOR, SparseVectorParamsBuilder::default());

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.config.collection)
                    .vectors_config(vectors)
                    .sparse_vectors_config(sparse_vectors),
            )
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        info!(
            collection = %self.config.collection,
            dim = self.config.vector_dim,
            "created hybrid collection"
        );
        Ok(())
    }
}

#[async_trait]
impl HybridIndex for QdrantIndex {
    async fn upsert(&self, points: Vec<ChildPoint>) -> Result<(), RagError> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let points: Vec<PointStruct> = points.into_iter().map(point_struct).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        debug!(count, collection = %self.config.collection, "upserted child points");
        Ok(())
    }

    async fn search(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
    ) -> Result<Vec<ChildHit>, RagError> {
        let mut request = QueryPointsBuilder::new(&self.config.collection)
            .add_prefetch(
                PrefetchQueryBuilder::default()
                    .query(Query::new_nearest(dense.to_vec()))
                    .using(DENSE_VECTOR)
                    .limit(limit as u64),
            )
            .limit(limit as u64)
            .with_payload(true);

        // An empty sparse query contributes nothing to fusion; fall back
        // to the dense branch alone.
        if sparse.is_empty() {
            request = request.query(Query::new_nearest(VectorInput::new_dense(dense.to_vec())));
            request = request.using(DENSE_VECTOR);
        } else {
            request = request
                .add_prefetch(
                    PrefetchQueryBuilder::default()
                        .query(Query::new_nearest(VectorInput::new_sparse(
                            sparse.indices.clone(),
                            sparse.values.clone(),
                        )))
                        .using(SPARSE_VECTOR)
                        .limit(limit as u64),
                )
                .query(Query::new_fusion(Fusion::Rrf));
        }

        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(response.result.into_iter().filter_map(child_hit).collect())
    }

    async fn count(&self) -> Result<usize, RagError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.config.collection).exact(true))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), RagError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.config.collection).points(Filter::must([
                    Condition::matches(payload_keys::DOCUMENT_ID, document_id.to_string()),
                ])),
            )
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(())
    }
}

fn point_struct(point: ChildPoint) -> PointStruct {
    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert(payload_keys::PARENT_ID.to_string(), point.parent_id.into());
    payload.insert(
        payload_keys::DOCUMENT_ID.to_string(),
        point.document_id.into(),
    );
    payload.insert(payload_keys::TEXT.to_string(), point.text.into());
    if let Some(title) = point.title {
        payload.insert(payload_keys::TITLE.to_string(), title.into());
    }
    if let Some(law_id) = point.law_id {
        payload.insert(payload_keys::LAW_ID.to_string(), law_id.into());
    }

    let vectors = NamedVectors::default()
        .add_vector(DENSE_VECTOR, Vector::new_dense(point.dense))
        .add_vector(
            SPARSE_VECTOR,
            Vector::new_sparse(point.sparse.indices, point.sparse.values),
        );

    PointStruct::new(point.id, vectors, payload)
}

fn child_hit(point: ScoredPoint) -> Option<ChildHit> {
    let child_id = point.id.as_ref().map(point_id_string).unwrap_or_default();

    let parent_id = point
        .payload
        .get(payload_keys::PARENT_ID)
        .and_then(|v| match &v.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        })?;

    Some(ChildHit {
        child_id,
        parent_id,
        score: point.score,
    })
}

fn point_id_string(id: &qdrant_client::qdrant::PointId) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match &id.point_id_options {
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_hit_requires_parent_id() {
        let point = ScoredPoint {
            id: Some("11111111-2222-3333-4444-555555555555".to_string().into()),
            score: 0.8,
            ..Default::default()
        };
        // No parent_id in payload: the point is unusable downstream.
        assert!(child_hit(point).is_none());
    }

    #[test]
    fn test_child_hit_extracts_payload() {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(payload_keys::PARENT_ID.to_string(), "nd100_3".into());

        let point = ScoredPoint {
            id: Some("11111111-2222-3333-4444-555555555555".to_string().into()),
            payload,
            score: 0.42,
            ..Default::default()
        };

        let hit = child_hit(point).unwrap();
        assert_eq!(hit.parent_id, "nd100_3");
        assert_eq!(hit.child_id, "11111111-2222-3333-4444-555555555555");
        assert_eq!(hit.score, 0.42);
    }

    #[test]
    fn test_point_struct_carries_both_vectors_and_payload() {
        let point = point_struct(ChildPoint {
            id: "11111111-2222-3333-4444-555555555555".to_string(),
            parent_id: "nd100_0".to_string(),
            document_id: "nd100".to_string(),
            text: "Điều 1. Phạm vi điều chỉnh".to_string(),
            title: Some("Nghị định 100".to_string()),
            law_id: Some("nd-100-2019".to_string()),
            dense: vec![0.1, 0.2],
            sparse: SparseVector {
                indices: vec![3, 7],
                values: vec![1.0, 2.0],
            },
        });

        assert!(point.payload.contains_key(payload_keys::PARENT_ID));
        assert!(point.payload.contains_key(payload_keys::TEXT));
        assert!(point.payload.contains_key(payload_keys::LAW_ID));
        assert!(point.vectors.is_some());
    }
}
