//! Weighted fusion of rerank and BM25 scores.
//!
//! # Architecture
//!
//! ```ascii
//!            candidates (deduplicated)
//!              │                  │
//!              ▼                  ▼
//! ┌──────────────────┐   ┌──────────────────┐
//! │ SubChunkReranker │   │    Bm25Scorer    │
//! │  (remote, async) │   │ (local snapshot) │
//! └────────┬─────────┘   └────────┬─────────┘
//!          │ rerank score         │ normalize_scores → [0,1]
//!          ▼                      ▼
//! ┌─────────────────────────────────────────┐
//! │  w × rerank + (1 - w) × bm25            │
//! └────────────────────┬────────────────────┘
//!                      ▼
//!               sorted by blend
//! ```
//!
//! Weights within [`WEIGHT_EPSILON`] of 1.0 or 0.0 are treated as pure
//! rerank or pure lexical, so callers can skip the unused signal entirely.

use std::collections::HashMap;

use super::bm25::{normalize_scores, Bm25Params, Bm25Scorer};
use crate::types::{sort_by_score_desc, Document};

/// Distance from 0 or 1 under which a weight counts as exact.
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Score every document by normalized BM25 against `query`.
///
/// Returns the documents in input order with `score` replaced.
pub fn score_lexical(query: &str, docs: Vec<Document>, params: Bm25Params) -> Vec<Document> {
    let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
    let scorer = Bm25Scorer::new(&contents, params);
    let normalized = normalize_scores(&scorer.score(query));

    docs.into_iter()
        .zip(normalized)
        .map(|(doc, score)| doc.with_score(score))
        .collect()
}

/// Linear blend of a rerank signal and a lexical signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedFusion {
    rerank_weight: f64,
}

impl WeightedFusion {
    /// `rerank_weight` is clamped to [0,1].
    pub fn new(rerank_weight: f64) -> Self {
        Self {
            rerank_weight: rerank_weight.clamp(0.0, 1.0),
        }
    }

    pub fn rerank_weight(&self) -> f64 {
        self.rerank_weight
    }

    pub fn is_pure_rerank(&self) -> bool {
        (self.rerank_weight - 1.0).abs() < WEIGHT_EPSILON
    }

    pub fn is_pure_lexical(&self) -> bool {
        self.rerank_weight.abs() < WEIGHT_EPSILON
    }

    #[inline]
    pub fn combine(&self, rerank_score: f64, lexical_score: f64) -> f64 {
        self.rerank_weight * rerank_score + (1.0 - self.rerank_weight) * lexical_score
    }

    /// Blend reranked documents with lexical scores looked up by id, then
    /// sort by the blended score.
    ///
    /// A document absent from `lexical` contributes a lexical score of 0.
    pub fn fuse(&self, reranked: Vec<Document>, lexical: &[Document]) -> Vec<Document> {
        let lexical_by_id: HashMap<&str, f64> = lexical
            .iter()
            .map(|d| (d.id.as_str(), d.score))
            .collect();

        let mut fused: Vec<Document> = reranked
            .into_iter()
            .map(|doc| {
                let lexical_score = lexical_by_id.get(doc.id.as_str()).copied().unwrap_or(0.0);
                let score = self.combine(doc.score, lexical_score);
                doc.with_score(score)
            })
            .collect();

        sort_by_score_desc(&mut fused);
        fused
    }
}
