//! Deterministic collaborators for tests.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Mock Collaborators                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  MockSimilaritySearch   MockReranker          MockQueryRewriter │
//! │  ├── with_query_results ├── with_passage_score├── add_response()│
//! │  ├── failing()          ├── fail_on_call()    ├── add_error()   │
//! │  ├── cancelled_for()    └── batches()         ├── add_failure() │
//! │  └── calls()                                  └── used_keywords │
//! │                                                                 │
//! │  MockChatCompletion (queue-based LLM for LlmQueryRewriter)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All mocks are cheap to clone; clones share their call logs, so a test
//! can keep a handle after moving one into a `Retriever`.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{Result, RetrievalError};
use crate::reranker::{tokenize, RerankResult, Reranker};
use crate::rewrite::{ChatCompletion, QueryRewriter};
use crate::search::{SearchQuery, SimilaritySearch};
use crate::types::Document;

// ============================================================================
// MockSimilaritySearch
// ============================================================================

/// Similarity search over a fixed document list.
///
/// Honors `top_k`, `score_threshold` and `exclude_ids` like a real store.
#[derive(Debug, Clone)]
pub struct MockSimilaritySearch {
    documents: Vec<Document>,
    per_query: HashMap<String, Vec<Document>>,
    failure: Option<String>,
    cancelled_queries: HashSet<String>,
    latency: Option<Duration>,
    calls: Arc<Mutex<Vec<SearchQuery>>>,
    call_count: Arc<AtomicUsize>,
}

impl MockSimilaritySearch {
    /// Return `documents` (in this order) for every query.
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            per_query: HashMap::new(),
            failure: None,
            cancelled_queries: HashSet::new(),
            latency: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Return `documents` when the searched phrasing is exactly `query`.
    pub fn with_query_results(mut self, query: impl Into<String>, documents: Vec<Document>) -> Self {
        self.per_query.insert(query.into(), documents);
        self
    }

    /// Fail every call with a search error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Answer searches for exactly `query` with [`RetrievalError::Cancelled`].
    pub fn cancelled_for(mut self, query: impl Into<String>) -> Self {
        self.cancelled_queries.insert(query.into());
        self
    }

    /// Sleep before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every query received so far, in call order.
    pub async fn calls(&self) -> Vec<SearchQuery> {
        self.calls.lock().await.clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimilaritySearch for MockSimilaritySearch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Document>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().await.push(query.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.cancelled_queries.contains(&query.query) {
            return Err(RetrievalError::Cancelled);
        }
        if let Some(ref message) = self.failure {
            return Err(RetrievalError::Search(message.clone()));
        }

        let source = self.per_query.get(&query.query).unwrap_or(&self.documents);
        let excluded: HashSet<&str> = query.exclude_ids.iter().map(String::as_str).collect();

        Ok(source
            .iter()
            .filter(|d| !excluded.contains(d.id.as_str()))
            .filter(|d| d.score >= query.score_threshold)
            .take(query.top_k)
            .cloned()
            .collect())
    }
}

// ============================================================================
// MockReranker
// ============================================================================

/// Passage reranker with deterministic scores.
///
/// A passage containing a registered fragment gets that fragment's score
/// (first registered match wins). Anything else scores the share of
/// distinct query terms it contains.
#[derive(Debug, Clone, Default)]
pub struct MockReranker {
    passage_scores: Vec<(String, f64)>,
    always_fail: bool,
    fail_on_call: Option<usize>,
    latency: Option<Duration>,
    call_count: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockReranker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score passages containing `fragment` as `score`.
    pub fn with_passage_score(mut self, fragment: impl Into<String>, score: f64) -> Self {
        self.passage_scores.push((fragment.into(), score));
        self
    }

    /// Fail every call.
    pub fn failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// Fail only the `n`th call (1-based).
    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Sleep before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Passages of every call, in call order.
    pub async fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().await.clone()
    }

    fn score(&self, query_terms: &HashSet<String>, passage: &str) -> f64 {
        if let Some((_, score)) = self
            .passage_scores
            .iter()
            .find(|(fragment, _)| passage.contains(fragment.as_str()))
        {
            return *score;
        }
        if query_terms.is_empty() {
            return 0.0;
        }
        let passage_terms: HashSet<String> = tokenize(passage).into_iter().collect();
        let hits = query_terms.intersection(&passage_terms).count();
        hits as f64 / query_terms.len() as f64
    }
}

#[async_trait]
impl Reranker for MockReranker {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-reranker"
    }

    async fn rerank(
        &self,
        query: &str,
        passages: &[String],
        top_n: Option<usize>,
    ) -> Result<Vec<RerankResult>> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.batches.lock().await.push(passages.to_vec());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.always_fail || self.fail_on_call == Some(call) {
            return Err(RetrievalError::ApiError {
                status: 502,
                message: format!("mock rerank failure on call {}", call),
            });
        }

        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        let mut results: Vec<RerankResult> = passages
            .iter()
            .enumerate()
            .map(|(index, passage)| RerankResult {
                index,
                relevance_score: self.score(&query_terms, passage),
            })
            .collect();

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(n) = top_n {
            results.truncate(n);
        }
        Ok(results)
    }
}

// ============================================================================
// MockQueryRewriter
// ============================================================================

/// Query rewriter replaying scripted responses.
///
/// Each call pops the next scripted outcome; an exhausted script is an
/// error.
#[derive(Debug, Clone, Default)]
pub struct MockQueryRewriter {
    script: Arc<Mutex<VecDeque<Result<String>>>>,
    used_seen: Arc<Mutex<Vec<String>>>,
    latency: Option<Duration>,
}

impl MockQueryRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful rewrite.
    pub async fn add_response(&self, phrasing: impl Into<String>) {
        self.script.lock().await.push_back(Ok(phrasing.into()));
    }

    /// Queue a failed rewrite.
    pub async fn add_error(&self, message: impl Into<String>) {
        self.script
            .lock()
            .await
            .push_back(Err(RetrievalError::Rewrite(message.into())));
    }

    /// Queue an arbitrary error, e.g. [`RetrievalError::Cancelled`].
    pub async fn add_failure(&self, error: RetrievalError) {
        self.script.lock().await.push_back(Err(error));
    }

    /// Sleep before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The `used` keyword string passed to each call, in call order.
    pub async fn used_keywords(&self) -> Vec<String> {
        self.used_seen.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.used_seen.lock().await.len()
    }
}

#[async_trait]
impl QueryRewriter for MockQueryRewriter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, used: &str, _query: &str, _knowledge_id: &str) -> Result<String> {
        self.used_seen.lock().await.push(used.to_string());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(RetrievalError::Rewrite("no scripted rewrite left".to_string())))
    }
}

// ============================================================================
// MockChatCompletion
// ============================================================================

/// Chat model returning queued answers, recording every prompt pair.
#[derive(Debug, Clone, Default)]
pub struct MockChatCompletion {
    responses: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockChatCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response to the queue.
    pub async fn add_response(&self, response: impl Into<String>) {
        self.responses.lock().await.push_back(response.into());
    }

    /// `(system, user)` pairs received so far.
    pub async fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl ChatCompletion for MockChatCompletion {
    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.prompts
            .lock()
            .await
            .push((system.to_string(), user.to_string()));

        let mut responses = self.responses.lock().await;
        Ok(responses
            .pop_front()
            .unwrap_or_else(|| "mock keywords".to_string()))
    }
}
