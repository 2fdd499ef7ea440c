//! Score-preserving parent resolution
//!
//! Hybrid search returns child hits; generation wants parents. Several
//! children of the same parent may rank in the candidate set, so the
//! join must deduplicate without losing ranking signal: each parent
//! keeps the maximum score across its children, and candidate order
//! follows the first occurrence of each parent in the hit list.

use std::collections::HashMap;

/// One child-level search hit
#[derive(Debug, Clone)]
pub struct ChildHit {
    pub child_id: String,
    pub parent_id: String,
    pub score: f32,
}

/// A parent-level candidate produced by resolution
#[derive(Debug, Clone)]
pub struct ParentCandidate {
    pub parent_id: String,
    /// Maximum score across this parent's children in the hit list
    pub score: f32,
    /// How many children of this parent appeared in the hit list
    pub child_hits: usize,
}

/// Collapse child hits into parent candidates.
///
/// First occurrence fixes a parent's position; later hits for the same
/// parent only raise its score. Hits with an empty parent id are
/// dropped.
pub fn resolve_parents(hits: &[ChildHit]) -> Vec<ParentCandidate> {
    let mut by_parent: HashMap<&str, usize> = HashMap::new();
    let mut candidates: Vec<ParentCandidate> = Vec::new();

    for hit in hits {
        if hit.parent_id.is_empty() {
            continue;
        }
        match by_parent.get(hit.parent_id.as_str()) {
            Some(&idx) => {
                let candidate = &mut candidates[idx];
                candidate.child_hits += 1;
                if hit.score > candidate.score {
                    candidate.score = hit.score;
                }
            }
            None => {
                by_parent.insert(hit.parent_id.as_str(), candidates.len());
                candidates.push(ParentCandidate {
                    parent_id: hit.parent_id.clone(),
                    score: hit.score,
                    child_hits: 1,
                });
            }
        }
    }

    candidates
}
