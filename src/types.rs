//! Core retrieval types.
//!
//! ```ascii
//! RetrieveRequest (caller overrides, all optional but query/knowledge_id)
//!        │  resolve(config)
//!        ▼
//! ResolvedRequest (every field concrete + optimized_query + exclude_ids)
//!        │  shallow clone per rewrite branch
//!        ▼
//! Strategy ──► Vec<Document>
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::RetrieverConfig;
use crate::error::{Result, RetrievalError};

/// A content chunk returned by retrieval.
///
/// `score` changes meaning per stage (similarity, rerank relevance, fused);
/// every strategy hands back scores on a common [0,1] scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable chunk identity.
    pub id: String,
    /// Chunk text.
    pub content: String,
    /// Relevance score.
    #[serde(default)]
    pub score: f64,
    /// Passthrough metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    /// Create a document with a zero score and no metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            score: 0.0,
            metadata: HashMap::new(),
        }
    }

    /// Set the score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Retrieval mode.
///
/// The set of modes is closed, so dispatch is a plain `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieveMode {
    /// Similarity search only.
    #[serde(alias = "milvus")]
    Vector,
    /// Over-fetch, then rerank (optionally hybridized with BM25).
    #[default]
    Rerank,
    /// Reciprocal rank fusion of a vector pass and a rerank pass.
    Rrf,
}

impl fmt::Display for RetrieveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrieveMode::Vector => write!(f, "vector"),
            RetrieveMode::Rerank => write!(f, "rerank"),
            RetrieveMode::Rrf => write!(f, "rrf"),
        }
    }
}

impl FromStr for RetrieveMode {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" | "milvus" => Ok(RetrieveMode::Vector),
            "rerank" => Ok(RetrieveMode::Rerank),
            "rrf" => Ok(RetrieveMode::Rrf),
            other => Err(RetrievalError::InvalidRequest(format!(
                "unknown retrieve mode '{}', expected vector, rerank or rrf",
                other
            ))),
        }
    }
}

/// A retrieval request as received from the upstream layer.
///
/// Only `query` and `knowledge_id` are required; every `None` override is
/// filled from [`RetrieverConfig`] by [`RetrieveRequest::resolve`].
///
/// # Example
///
/// ```
/// use edgequake_retrieval::{RetrieveMode, RetrieveRequest};
///
/// let request = RetrieveRequest::new("how does fsdp shard parameters", "kb_ml")
///     .with_top_k(8)
///     .with_mode(RetrieveMode::Rrf)
///     .with_rewrite(true);
/// assert_eq!(request.top_k, Some(8));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveRequest {
    /// Natural-language query.
    pub query: String,
    /// Target knowledge collection.
    pub knowledge_id: String,
    /// Number of documents to return.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Minimum final score, in [0,1].
    #[serde(default, alias = "score")]
    pub score_threshold: Option<f64>,
    /// Whether to fan out over rewritten queries.
    #[serde(default)]
    pub enable_rewrite: Option<bool>,
    /// Number of rewrite attempts, at most [`MAX_REWRITE_ATTEMPTS`].
    /// Zero or negative falls back to the configured value.
    #[serde(default)]
    pub rewrite_attempts: Option<i64>,
    /// Retrieval mode.
    #[serde(default)]
    pub retrieve_mode: Option<RetrieveMode>,
    /// Rerank vs BM25 mixing weight, in [0,1]. 1.0 = pure rerank.
    #[serde(default)]
    pub rerank_weight: Option<f64>,
    /// Chunk identities to keep out of the results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_ids: Vec<String>,
}

impl RetrieveRequest {
    /// Create a request with all overrides unset.
    pub fn new(query: impl Into<String>, knowledge_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            knowledge_id: knowledge_id.into(),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn with_rewrite(mut self, enable: bool) -> Self {
        self.enable_rewrite = Some(enable);
        self
    }

    pub fn with_rewrite_attempts(mut self, attempts: i64) -> Self {
        self.rewrite_attempts = Some(attempts);
        self
    }

    pub fn with_mode(mut self, mode: RetrieveMode) -> Self {
        self.retrieve_mode = Some(mode);
        self
    }

    pub fn with_rerank_weight(mut self, weight: f64) -> Self {
        self.rerank_weight = Some(weight);
        self
    }

    pub fn with_exclude_ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the request and fill every unset override from `config`.
    pub fn resolve(&self, config: &RetrieverConfig) -> Result<ResolvedRequest> {
        if self.query.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest("query is required".to_string()));
        }
        if self.knowledge_id.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest(
                "knowledge_id is required".to_string(),
            ));
        }

        let top_k = self.top_k.unwrap_or(config.top_k);
        if top_k == 0 {
            return Err(RetrievalError::InvalidRequest(
                "top_k must be greater than 0".to_string(),
            ));
        }

        let score_threshold = self.score_threshold.unwrap_or(config.score_threshold);
        if !(0.0..=1.0).contains(&score_threshold) {
            return Err(RetrievalError::InvalidRequest(format!(
                "score_threshold must be within [0, 1], got {}",
                score_threshold
            )));
        }

        let rerank_weight = self.rerank_weight.unwrap_or(config.rerank_weight);
        if !(0.0..=1.0).contains(&rerank_weight) {
            return Err(RetrievalError::InvalidRequest(format!(
                "rerank_weight must be within [0, 1], got {}",
                rerank_weight
            )));
        }

        let rewrite_attempts = match self.rewrite_attempts {
            Some(n) if n > MAX_REWRITE_ATTEMPTS as i64 => {
                return Err(RetrievalError::InvalidRequest(format!(
                    "rewrite_attempts must be at most {}, got {}",
                    MAX_REWRITE_ATTEMPTS, n
                )));
            }
            Some(n) if n > 0 => n as usize,
            Some(_) => DEFAULT_REWRITE_ATTEMPTS,
            None if config.rewrite_attempts > 0 => config.rewrite_attempts,
            None => DEFAULT_REWRITE_ATTEMPTS,
        };

        Ok(ResolvedRequest {
            query: self.query.clone(),
            knowledge_id: self.knowledge_id.clone(),
            top_k,
            score_threshold,
            enable_rewrite: self.enable_rewrite.unwrap_or(config.enable_rewrite),
            rewrite_attempts,
            mode: self.retrieve_mode.unwrap_or(config.retrieve_mode),
            rerank_weight,
            optimized_query: self.query.clone(),
            exclude_ids: self.exclude_ids.iter().cloned().collect::<Vec<_>>().into(),
        })
    }
}

const DEFAULT_REWRITE_ATTEMPTS: usize = 3;

/// Upper bound on rewrite attempts per request. Each attempt is one LLM
/// call and one extra strategy branch.
pub const MAX_REWRITE_ATTEMPTS: usize = 10;

/// A request with every default filled in, ready for a strategy.
///
/// Strategies take it by reference; the rewrite orchestrator hands each
/// branch its own clone with `optimized_query` replaced. `exclude_ids` is
/// shared behind an `Arc` so clones stay shallow.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub query: String,
    pub knowledge_id: String,
    pub top_k: usize,
    pub score_threshold: f64,
    pub enable_rewrite: bool,
    pub rewrite_attempts: usize,
    pub mode: RetrieveMode,
    pub rerank_weight: f64,
    /// The phrasing actually sent to the similarity search.
    pub optimized_query: String,
    pub exclude_ids: Arc<[String]>,
}

impl ResolvedRequest {
    /// Copy of this request searching under a different phrasing.
    pub fn with_optimized_query(&self, query: impl Into<String>) -> Self {
        Self {
            optimized_query: query.into(),
            ..self.clone()
        }
    }
}

/// Sort documents by score, highest first. Stable: ties keep input order.
pub(crate) fn sort_by_score_desc(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Drop repeated ids, keeping the first occurrence.
pub(crate) fn dedup_by_id(docs: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::with_capacity(docs.len());
    docs.into_iter()
        .filter(|doc| seen.insert(doc.id.clone()))
        .collect()
}

/// Drop documents whose id is excluded.
pub(crate) fn remove_excluded(docs: Vec<Document>, exclude_ids: &[String]) -> Vec<Document> {
    if exclude_ids.is_empty() {
        return docs;
    }
    let excluded: HashSet<&str> = exclude_ids.iter().map(String::as_str).collect();
    docs.into_iter()
        .filter(|doc| !excluded.contains(doc.id.as_str()))
        .collect()
}
