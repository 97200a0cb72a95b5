//! Remote reranker trait.
//!
//! A reranker scores short passages against a query. It knows nothing about
//! documents, windows or thresholds; the sub-chunk layer builds robust
//! document scores on top of it.
//!
//! # Implementations
//!
//! - [`super::HttpReranker`] - Remote cross-encoder endpoint
//! - [`crate::mock::MockReranker`] - Deterministic scoring for tests

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Score of one passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankResult {
    /// Index of the passage in the submitted list.
    pub index: usize,
    /// Relevance score (higher is more relevant). Scale is endpoint-defined.
    pub relevance_score: f64,
}

/// Trait for rerank endpoints.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Get the name of this reranker.
    fn name(&self) -> &str;

    /// Get the model being used.
    fn model(&self) -> &str;

    /// Score `passages` against `query`.
    ///
    /// # Arguments
    ///
    /// - `query`: The search query to rank against
    /// - `passages`: Short texts to score
    /// - `top_n`: Maximum number of results to return (None = all)
    ///
    /// Results carry the passage's index in `passages`; their order is not
    /// significant.
    async fn rerank(
        &self,
        query: &str,
        passages: &[String],
        top_n: Option<usize>,
    ) -> Result<Vec<RerankResult>>;
}
