//! Parent chunk storage
//!
//! Parents are never indexed in the vector store; only children are.
//! After search, child hits are resolved back to their parents through
//! this store. Missing ids are skipped, not errors: an index may briefly
//! reference parents from a partially completed ingestion run.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::splitter::ParentChunk;
use crate::RagError;

/// Keyed lookup of parent chunks
#[async_trait]
pub trait ParentStore: Send + Sync {
    /// Store a batch of parents, overwriting existing ids
    async fn put(&self, parents: Vec<ParentChunk>) -> Result<(), RagError>;

    /// Fetch parents by id, preserving request order. Unknown ids are
    /// dropped from the result.
    async fn get(&self, ids: &[String]) -> Result<Vec<ParentChunk>, RagError>;

    /// Number of stored parents
    async fn len(&self) -> Result<usize, RagError>;

    /// Remove every parent belonging to a document
    async fn remove_document(&self, document_id: &str) -> Result<usize, RagError>;
}

/// In-memory parent store
#[derive(Default)]
pub struct InMemoryParentStore {
    parents: RwLock<HashMap<String, ParentChunk>>,
}

impl InMemoryParentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParentStore for InMemoryParentStore {
    async fn put(&self, parents: Vec<ParentChunk>) -> Result<(), RagError> {
        let mut store = self.parents.write();
        for parent in parents {
            store.insert(parent.id.clone(), parent);
        }
        Ok(())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ParentChunk>, RagError> {
        let store = self.parents.read();
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match store.get(id) {
                Some(parent) => found.push(parent.clone()),
                None => warn!(parent_id = %id, "parent id not found, skipping"),
            }
        }
        Ok(found)
    }

    async fn len(&self) -> Result<usize, RagError> {
        Ok(self.parents.read().len())
    }

    async fn remove_document(&self, document_id: &str) -> Result<usize, RagError> {
        let mut store = self.parents.write();
        let before = store.len();
        store.retain(|_, p| p.source_document_id != document_id);
        Ok(before - store.len())
    }
}
