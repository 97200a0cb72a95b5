//! Reranker configuration types.
//!
//! # Architecture
//!
//! ```ascii
//! ┌─────────────────────────────────────────────────────────┐
//! │                    RerankConfig                          │
//! ├─────────────────────────────────────────────────────────┤
//! │ model: String          ─────► Which model to use        │
//! │ base_url: Option       ─────► API endpoint              │
//! │ api_key: Option        ─────► Authentication            │
//! │ timeout_secs: u64      ─────► Request timeout           │
//! └─────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────┐
//! │                   SubChunkConfig                         │
//! ├─────────────────────────────────────────────────────────┤
//! │ sub_chunk_size / overlap_size ──► sliding window (chars)│
//! │ max_sub_chunks_per_doc        ──► 0 = unlimited         │
//! │ aggregate_strategy            ──► max | mean | topk_mean│
//! │ score_threshold               ──► relative window filter│
//! │ batch_size                    ──► windows per API call  │
//! └─────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, RetrievalError};

/// Default model name when none is configured.
pub const DEFAULT_RERANK_MODEL: &str = "rerank-v1";

/// Environment fallback for the rerank API key.
pub const RERANK_API_KEY_ENV: &str = "RERANK_API_KEY";

/// Environment fallback for the rerank base URL.
pub const RERANK_BASE_URL_ENV: &str = "RERANK_BASE_URL";

/// Configuration for the remote rerank endpoint.
///
/// Any gateway speaking the standard rerank dialect works with a plain
/// `base_url`; `/rerank` is appended unless the URL already points at a
/// rerank route. [`RerankConfig::aliyun`] fills in the DashScope route,
/// whose wrapped payload the client detects by URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Model name to use.
    pub model: String,
    /// Base URL for the reranker API.
    pub base_url: Option<String>,
    /// API key for authentication.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_RERANK_MODEL.to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl RerankConfig {
    /// Aliyun DashScope reranker (`gte-rerank-v2`).
    pub fn aliyun(api_key: impl Into<String>) -> Self {
        Self {
            model: "gte-rerank-v2".to_string(),
            base_url: Some(
                "https://dashscope.aliyuncs.com/api/v1/services/rerank/text-rerank/text-rerank"
                    .to_string(),
            ),
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Fill missing key / URL / model from the environment and defaults.
    ///
    /// A missing base URL after the fallback is a configuration error.
    pub fn resolve_env(&self) -> Result<Self> {
        let mut resolved = self.clone();

        if resolved.api_key.as_deref().map_or(true, str::is_empty) {
            resolved.api_key = std::env::var(RERANK_API_KEY_ENV)
                .ok()
                .filter(|k| !k.is_empty());
        }
        if resolved.base_url.as_deref().map_or(true, str::is_empty) {
            resolved.base_url = std::env::var(RERANK_BASE_URL_ENV)
                .ok()
                .filter(|u| !u.is_empty());
        }
        if resolved.base_url.is_none() {
            return Err(RetrievalError::ConfigError(format!(
                "rerank base_url is required (set it in config or {})",
                RERANK_BASE_URL_ENV
            )));
        }
        if resolved.model.trim().is_empty() {
            resolved.model = DEFAULT_RERANK_MODEL.to_string();
        }

        Ok(resolved)
    }

    /// Full endpoint URL for rerank calls.
    pub fn endpoint(&self) -> Option<String> {
        let base = self.base_url.as_deref()?.trim_end_matches('/');
        if base.ends_with("rerank") {
            Some(base.to_string())
        } else {
            Some(format!("{}/rerank", base))
        }
    }
}

/// Strategy for aggregating window scores into one document score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStrategy {
    /// Highest surviving window score.
    #[default]
    Max,
    /// Mean of the surviving window scores.
    Mean,
    /// Mean of the best `top_k_for_mean` surviving window scores.
    #[serde(rename = "topk_mean", alias = "top_k_mean")]
    TopKMean,
}

impl std::fmt::Display for AggregateStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateStrategy::Max => write!(f, "max"),
            AggregateStrategy::Mean => write!(f, "mean"),
            AggregateStrategy::TopKMean => write!(f, "topk_mean"),
        }
    }
}

/// Sliding-window sub-chunk rerank configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubChunkConfig {
    /// Window size in characters (Unicode scalar values).
    pub sub_chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub overlap_size: usize,
    /// How window scores collapse into a document score.
    pub aggregate_strategy: AggregateStrategy,
    /// K for [`AggregateStrategy::TopKMean`].
    pub top_k_for_mean: usize,
    /// Window cap per document, 0 = unlimited.
    pub max_sub_chunks_per_doc: usize,
    /// Windows below `max_window_score * score_threshold` are dropped. 0 disables.
    pub score_threshold: f64,
    /// Windows per remote rerank call.
    pub batch_size: usize,
}

impl Default for SubChunkConfig {
    fn default() -> Self {
        Self {
            sub_chunk_size: 250,
            overlap_size: 50,
            aggregate_strategy: AggregateStrategy::Max,
            top_k_for_mean: 2,
            max_sub_chunks_per_doc: 0,
            score_threshold: 0.6,
            batch_size: 30,
        }
    }
}

impl SubChunkConfig {
    pub fn with_window(mut self, sub_chunk_size: usize, overlap_size: usize) -> Self {
        self.sub_chunk_size = sub_chunk_size;
        self.overlap_size = overlap_size;
        self
    }

    pub fn with_strategy(mut self, strategy: AggregateStrategy) -> Self {
        self.aggregate_strategy = strategy;
        self
    }

    pub fn with_max_sub_chunks(mut self, max: usize) -> Self {
        self.max_sub_chunks_per_doc = max;
        self
    }

    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        if self.sub_chunk_size == 0 {
            return Err(RetrievalError::ConfigError(
                "sub_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RetrievalError::ConfigError(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(RetrievalError::ConfigError(format!(
                "sub-chunk score_threshold must be within [0, 1], got {}",
                self.score_threshold
            )));
        }
        Ok(())
    }
}
