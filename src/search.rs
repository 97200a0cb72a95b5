//! Similarity search collaborator.
//!
//! The vector store lives outside this crate. Strategies only see the
//! [`SimilaritySearch`] trait and hand it a [`SearchQuery`].
//!
//! Scores coming back are expected on a [0,1] scale. Results are not
//! assumed to be unique by id; callers deduplicate.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::CandidateConfig;
use crate::error::Result;
use crate::types::{Document, ResolvedRequest};

/// One similarity search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Phrasing to embed and search with.
    pub query: String,
    /// Collection to search.
    pub knowledge_id: String,
    /// Maximum documents to return.
    pub top_k: usize,
    /// Minimum similarity score.
    pub score_threshold: f64,
    /// Ids the store should leave out.
    pub exclude_ids: Arc<[String]>,
}

impl SearchQuery {
    /// Search for exactly `request.top_k` documents.
    pub fn direct(request: &ResolvedRequest) -> Self {
        Self::with_top_k(request, request.top_k)
    }

    /// Search for an enlarged candidate pool to feed a reranker.
    pub fn overfetch(request: &ResolvedRequest, candidates: &CandidateConfig) -> Self {
        Self::with_top_k(request, candidates.overfetch_top_k(request.top_k))
    }

    fn with_top_k(request: &ResolvedRequest, top_k: usize) -> Self {
        Self {
            query: request.optimized_query.clone(),
            knowledge_id: request.knowledge_id.clone(),
            top_k,
            score_threshold: request.score_threshold,
            exclude_ids: Arc::clone(&request.exclude_ids),
        }
    }
}

/// Trait for similarity search backends.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Return up to `query.top_k` documents, best first.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Document>>;
}
