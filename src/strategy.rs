//! Retrieval strategies.
//!
//! One [`StrategyExecutor::execute`] call is one complete retrieval attempt
//! for one phrasing of the query. The mode is a closed set, so dispatch is a
//! plain `match` on [`RetrieveMode`].
//!
//! # Modes
//!
//! ```ascii
//! vector  search(top_k) ─────────────────────────────────────────► out
//!
//! rerank  search(max(top_k×3, 15)) ─► dedup ─┬─ w≈1 ─► sub-chunk rerank ─┐
//!                                            ├─ w≈0 ─► BM25 (normalized) ├─► out
//!                                            └─ else ─► w×rerank +       │
//!                                                      (1-w)×BM25 ───────┘
//!
//! rrf     pass 1: search ───────────────────────────┐
//!         pass 2: search ─► rerank(top_k×2) ────────┴─► RRF(k=60) ─► out
//! ```
//!
//! Every mode ends with: sort descending, truncate to `top_k`, then drop
//! scores strictly below the threshold. A response may hold fewer than
//! `top_k` documents.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::RetrieverConfig;
use crate::error::Result;
use crate::reranker::{score_lexical, Reranker, RrfFusion, SubChunkReranker, WeightedFusion};
use crate::search::{SearchQuery, SimilaritySearch};
use crate::types::{
    dedup_by_id, remove_excluded, sort_by_score_desc, Document, ResolvedRequest, RetrieveMode,
};

/// Runs a single retrieval strategy against the search and rerank
/// collaborators.
#[derive(Clone)]
pub struct StrategyExecutor {
    search: Arc<dyn SimilaritySearch>,
    sub_chunk: SubChunkReranker,
    config: Arc<RetrieverConfig>,
}

impl std::fmt::Debug for StrategyExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyExecutor")
            .field("search", &self.search.name())
            .field("sub_chunk", &self.sub_chunk)
            .finish()
    }
}

impl StrategyExecutor {
    pub fn new(
        search: Arc<dyn SimilaritySearch>,
        reranker: Arc<dyn Reranker>,
        config: Arc<RetrieverConfig>,
    ) -> Self {
        Self {
            search,
            sub_chunk: SubChunkReranker::new(reranker),
            config,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Run the strategy selected by `request.mode` on
    /// `request.optimized_query`.
    ///
    /// Collaborator failures propagate; there is no fallback between modes.
    #[instrument(
        name = "retrieve_strategy",
        skip(self, request),
        fields(
            mode = %request.mode,
            knowledge_id = %request.knowledge_id,
            query = %request.optimized_query,
        )
    )]
    pub async fn execute(&self, request: &ResolvedRequest) -> Result<Vec<Document>> {
        let started = Instant::now();

        let docs = match request.mode {
            RetrieveMode::Vector => self.vector(request).await?,
            RetrieveMode::Rerank => self.rerank(request).await?,
            RetrieveMode::Rrf => self.rrf(request).await?,
        };

        info!(
            returned = docs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Strategy completed"
        );
        Ok(docs)
    }

    async fn vector(&self, request: &ResolvedRequest) -> Result<Vec<Document>> {
        let mut docs = self.search_candidates(&SearchQuery::direct(request)).await?;
        sort_by_score_desc(&mut docs);
        docs.truncate(request.top_k);
        Ok(apply_threshold(docs, request.score_threshold))
    }

    async fn rerank(&self, request: &ResolvedRequest) -> Result<Vec<Document>> {
        let query = request.optimized_query.as_str();
        let candidates = self
            .search_candidates(&SearchQuery::overfetch(request, &self.config.candidates))
            .await?;
        info!(candidates = candidates.len(), "Retrieved documents before rerank");

        let fusion = WeightedFusion::new(request.rerank_weight);
        let mut ranked = if fusion.is_pure_rerank() {
            self.sub_chunk
                .rerank_with_sub_chunks(query, candidates, request.top_k, &self.config.sub_chunk)
                .await?
        } else if fusion.is_pure_lexical() {
            let mut lexical = score_lexical(query, candidates, self.config.bm25);
            sort_by_score_desc(&mut lexical);
            lexical
        } else {
            debug!(rerank_weight = fusion.rerank_weight(), "Hybrid rerank");
            let lexical = score_lexical(query, candidates.clone(), self.config.bm25);
            let reranked = self
                .sub_chunk
                .rerank_with_sub_chunks(query, candidates, 0, &self.config.sub_chunk)
                .await?;
            fusion.fuse(reranked, &lexical)
        };

        ranked.truncate(request.top_k);
        Ok(apply_threshold(ranked, request.score_threshold))
    }

    async fn rrf(&self, request: &ResolvedRequest) -> Result<Vec<Document>> {
        let query = request.optimized_query.as_str();
        let search_query = SearchQuery::overfetch(request, &self.config.candidates);
        let rerank_top_k = self.config.candidates.rrf_rerank_top_k(request.top_k);

        let vector_pass = async {
            let mut docs = self.search_candidates(&search_query).await?;
            sort_by_score_desc(&mut docs);
            Ok(docs)
        };
        let rerank_pass = async {
            let candidates = self.search_candidates(&search_query).await?;
            self.sub_chunk
                .rerank_with_sub_chunks(query, candidates, rerank_top_k, &self.config.sub_chunk)
                .await
        };
        let (vector_docs, reranked_docs) = tokio::try_join!(vector_pass, rerank_pass)?;
        debug!(
            vector_pass = vector_docs.len(),
            rerank_pass = reranked_docs.len(),
            "RRF passes complete"
        );

        let mut fused =
            RrfFusion::with_k(self.config.candidates.rrf_k).fuse(vec![vector_docs, reranked_docs]);
        fused.truncate(request.top_k);
        Ok(apply_threshold(fused, request.score_threshold))
    }

    /// Search, then deduplicate and drop excluded ids.
    async fn search_candidates(&self, query: &SearchQuery) -> Result<Vec<Document>> {
        let docs = self.search.search(query).await?;
        let docs = dedup_by_id(docs);
        Ok(remove_excluded(docs, &query.exclude_ids))
    }
}

/// Drop documents scoring strictly below `threshold`.
fn apply_threshold(docs: Vec<Document>, threshold: f64) -> Vec<Document> {
    let before = docs.len();
    let kept: Vec<Document> = docs.into_iter().filter(|d| d.score >= threshold).collect();
    if kept.len() < before {
        debug!(
            dropped = before - kept.len(),
            threshold, "Dropped documents below score threshold"
        );
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReranker, MockSimilaritySearch};
    use crate::types::RetrieveRequest;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("d1", "the quick brown fox jumps").with_score(0.90),
            Document::new("d2", "a lazy dog sleeps all day").with_score(0.85),
            Document::new("d3", "quick thinking saves the fox").with_score(0.80),
            Document::new("d4", "weather report for tuesday").with_score(0.75),
        ]
    }

    fn executor(search: MockSimilaritySearch, reranker: MockReranker) -> StrategyExecutor {
        StrategyExecutor::new(
            Arc::new(search),
            Arc::new(reranker),
            Arc::new(RetrieverConfig::default()),
        )
    }

    fn request(mode: RetrieveMode) -> RetrieveRequest {
        RetrieveRequest::new("quick fox", "kb")
            .with_mode(mode)
            .with_score_threshold(0.0)
    }

    #[tokio::test]
    async fn test_vector_is_direct_search() {
        let search = MockSimilaritySearch::new(corpus());
        let reranker = MockReranker::new();
        let exec = executor(search.clone(), reranker.clone());

        let resolved = request(RetrieveMode::Vector)
            .with_top_k(2)
            .resolve(exec.config())
            .unwrap();
        let docs = exec.execute(&resolved).await.unwrap();

        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert_eq!(search.calls().await[0].top_k, 2);
        assert_eq!(reranker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rerank_overfetches_and_dedups() {
        let mut docs = corpus();
        docs.push(Document::new("d1", "duplicate copy").with_score(0.1));
        let search = MockSimilaritySearch::new(docs);
        let exec = executor(search.clone(), MockReranker::new());

        let resolved = request(RetrieveMode::Rerank).resolve(exec.config()).unwrap();
        let docs = exec.execute(&resolved).await.unwrap();

        assert_eq!(search.calls().await[0].top_k, 15);
        let d1: Vec<&Document> = docs.iter().filter(|d| d.id == "d1").collect();
        assert_eq!(d1.len(), 1);
        assert_eq!(d1[0].content, "the quick brown fox jumps");
        assert_eq!(docs[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_pure_lexical_skips_reranker() {
        let reranker = MockReranker::new();
        let exec = executor(MockSimilaritySearch::new(corpus()), reranker.clone());

        let resolved = request(RetrieveMode::Rerank)
            .with_rerank_weight(0.0)
            .resolve(exec.config())
            .unwrap();
        let docs = exec.execute(&resolved).await.unwrap();

        assert_eq!(reranker.call_count(), 0);
        assert_eq!(docs[0].score, 1.0);
        let top_two: Vec<&str> = docs[..2].iter().map(|d| d.id.as_str()).collect();
        assert!(top_two.contains(&"d1") && top_two.contains(&"d3"));
        assert_eq!(docs.last().map(|d| d.score), Some(0.0));
    }

    #[tokio::test]
    async fn test_hybrid_blends_signals() {
        let reranker = MockReranker::new()
            .with_passage_score("lazy dog", 1.0)
            .with_passage_score("quick", 0.0)
            .with_passage_score("weather", 0.0);
        let exec = executor(MockSimilaritySearch::new(corpus()), reranker);

        let resolved = request(RetrieveMode::Rerank)
            .with_rerank_weight(0.5)
            .resolve(exec.config())
            .unwrap();
        let docs = exec.execute(&resolved).await.unwrap();

        // d2 = 0.5 × 1.0 rerank + 0.5 × 0 lexical; d1 = 0.5 × 0 + 0.5 × lexical
        let d2 = docs.iter().find(|d| d.id == "d2").unwrap();
        assert!((d2.score - 0.5).abs() < 1e-9);
        let d4 = docs.iter().find(|d| d.id == "d4").unwrap();
        assert_eq!(d4.score, 0.0);
        assert!(docs.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_threshold_is_applied_last() {
        let exec = executor(MockSimilaritySearch::new(corpus()), MockReranker::new());

        let resolved = RetrieveRequest::new("quick fox", "kb")
            .with_mode(RetrieveMode::Rerank)
            .with_score_threshold(0.4)
            .resolve(exec.config())
            .unwrap();
        let docs = exec.execute(&resolved).await.unwrap();

        assert!(docs.iter().all(|d| d.score >= 0.4));
        assert!(docs.len() < 4);
    }

    #[tokio::test]
    async fn test_rrf_fuses_two_passes() {
        let search = MockSimilaritySearch::new(corpus());
        let exec = executor(search.clone(), MockReranker::new());

        let resolved = request(RetrieveMode::Rrf)
            .with_top_k(3)
            .resolve(exec.config())
            .unwrap();
        let docs = exec.execute(&resolved).await.unwrap();

        assert_eq!(search.call_count(), 2);
        assert_eq!(docs.len(), 3);
        // d1 leads both passes.
        assert_eq!(docs[0].id, "d1");
        assert!((docs[0].score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_excluded_ids_never_returned() {
        let exec = executor(MockSimilaritySearch::new(corpus()), MockReranker::new());

        let resolved = request(RetrieveMode::Rrf)
            .with_exclude_ids(["d1"])
            .resolve(exec.config())
            .unwrap();
        let docs = exec.execute(&resolved).await.unwrap();
        assert!(docs.iter().all(|d| d.id != "d1"));
    }

    #[tokio::test]
    async fn test_rerank_failure_propagates() {
        let exec = executor(
            MockSimilaritySearch::new(corpus()),
            MockReranker::new().failing(),
        );

        let resolved = request(RetrieveMode::Rerank).resolve(exec.config()).unwrap();
        let err = exec.execute(&resolved).await.unwrap_err();
        assert_eq!(err.stage(), "rerank");
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let exec = executor(
            MockSimilaritySearch::new(corpus()).failing("store offline"),
            MockReranker::new(),
        );

        for mode in [RetrieveMode::Vector, RetrieveMode::Rerank, RetrieveMode::Rrf] {
            let resolved = request(mode).resolve(exec.config()).unwrap();
            let err = exec.execute(&resolved).await.unwrap_err();
            assert_eq!(err.stage(), "search");
        }
    }
}
