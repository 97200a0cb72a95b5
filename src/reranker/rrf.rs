//! Reciprocal Rank Fusion (RRF).
//!
//! Combines ranked lists without needing their scores to be comparable.
//!
//! # Algorithm
//!
//! ```ascii
//! RRF Score = Σ 1/(k + rank) for each ranking list
//!
//! Where:
//! - k = smoothing constant (default 60)
//! - rank = 1-indexed position in each list
//!
//! normalized = min(1, score / (lists / (k + 1)))
//! ```
//!
//! A document ranked first in every list scores exactly 1.0. A document
//! missing from a list simply gets no contribution from it.

use std::collections::HashMap;

use crate::types::{dedup_by_id, sort_by_score_desc, Document};

/// Default smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Reciprocal Rank Fusion over document lists keyed by id.
///
/// # Example
///
/// ```
/// use edgequake_retrieval::reranker::RrfFusion;
/// use edgequake_retrieval::Document;
///
/// let vector_pass = vec![Document::new("a", ""), Document::new("b", "")];
/// let rerank_pass = vec![Document::new("a", ""), Document::new("c", "")];
///
/// let fused = RrfFusion::new().fuse(vec![vector_pass, rerank_pass]);
/// assert_eq!(fused[0].id, "a");
/// assert!((fused[0].score - 1.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfFusion {
    k: f64,
}

impl RrfFusion {
    /// Create with the default k=60.
    pub fn new() -> Self {
        Self { k: DEFAULT_RRF_K }
    }

    /// Create with a custom k value. k below 1 is raised to 1, the same
    /// floor config validation enforces for `rrf_k`.
    pub fn with_k(k: f64) -> Self {
        Self { k: k.max(1.0) }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Rank-based score of a 1-indexed position.
    #[inline]
    pub fn rank_score(&self, rank: usize) -> f64 {
        1.0 / (self.k + rank as f64)
    }

    /// Fuse ranked lists (best first) into one list sorted by fused score.
    ///
    /// Each list is deduplicated by id before ranking. The returned document
    /// is the first copy seen, with its score replaced by the normalized
    /// fused score. Ties keep first-seen order.
    pub fn fuse(&self, lists: Vec<Vec<Document>>) -> Vec<Document> {
        let list_count = lists.len();
        if list_count == 0 {
            return Vec::new();
        }

        let mut fused: Vec<Document> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for list in lists {
            for (rank, doc) in dedup_by_id(list).into_iter().enumerate() {
                let contribution = self.rank_score(rank + 1);
                match positions.get(&doc.id) {
                    Some(&pos) => fused[pos].score += contribution,
                    None => {
                        positions.insert(doc.id.clone(), fused.len());
                        fused.push(doc.with_score(contribution));
                    }
                }
            }
        }

        let max_possible = list_count as f64 / (self.k + 1.0);
        for doc in &mut fused {
            doc.score = (doc.score / max_possible).min(1.0);
        }

        sort_by_score_desc(&mut fused);
        fused
    }
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self::new()
    }
}
