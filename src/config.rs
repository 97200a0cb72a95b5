//! Retriever configuration.
//!
//! Defaults used to fill every request override, plus the tuning knobs of
//! each stage.
//!
//! # Configuration File Location
//!
//! The config file is loaded from (in order of priority):
//! 1. `EDGEQUAKE_RETRIEVER_CONFIG` environment variable
//! 2. `./retriever.toml` (current working directory)
//! 3. `~/.edgequake/retriever.toml` (user config)
//! 4. Built-in default configuration
//!
//! # Example Configuration
//!
//! ```toml
//! top_k = 5
//! score_threshold = 0.2
//! enable_rewrite = true
//! rewrite_attempts = 3
//! retrieve_mode = "rrf"
//! rerank_weight = 0.7
//!
//! [candidates]
//! overfetch_factor = 3
//! min_candidates = 15
//! rrf_k = 60.0
//! rrf_rerank_factor = 2
//!
//! [sub_chunk]
//! sub_chunk_size = 250
//! overlap_size = 50
//! aggregate_strategy = "topk_mean"
//! top_k_for_mean = 2
//!
//! [bm25]
//! k1 = 1.5
//! b = 0.75
//!
//! [rerank]
//! model = "gte-rerank-v2"
//! base_url = "https://rerank.internal/v1"
//!
//! [rewrite]
//! max_attempts = 3
//! base_delay_ms = 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, RetrievalError, RetryStrategy};
use crate::reranker::{Bm25Params, RerankConfig, SubChunkConfig};
use crate::types::{RetrieveMode, MAX_REWRITE_ATTEMPTS};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "EDGEQUAKE_RETRIEVER_CONFIG";

const CONFIG_FILE_NAME: &str = "retriever.toml";

// ============================================================================
// Sections
// ============================================================================

/// Candidate pool sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Rerank strategies search for `top_k * overfetch_factor` candidates.
    pub overfetch_factor: usize,
    /// Floor on the over-fetched candidate count.
    pub min_candidates: usize,
    /// RRF smoothing constant.
    pub rrf_k: f64,
    /// The RRF rerank pass keeps `top_k * rrf_rerank_factor` documents.
    pub rrf_rerank_factor: usize,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: 3,
            min_candidates: 15,
            rrf_k: 60.0,
            rrf_rerank_factor: 2,
        }
    }
}

impl CandidateConfig {
    /// Candidate count to request from similarity search for a final `top_k`.
    pub fn overfetch_top_k(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.overfetch_factor)
            .max(self.min_candidates)
    }

    /// How many documents the RRF rerank pass keeps.
    pub fn rrf_rerank_top_k(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.rrf_rerank_factor)
    }
}

/// Retry policy for individual rewrite calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Tries per rewrite attempt, including the first. 1 disables retry.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each time.
    pub base_delay_ms: u64,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 300,
        }
    }
}

impl RewriteConfig {
    pub fn retry_strategy(&self) -> RetryStrategy {
        if self.max_attempts <= 1 {
            return RetryStrategy::NoRetry;
        }
        let base_delay = Duration::from_millis(self.base_delay_ms);
        RetryStrategy::ExponentialBackoff {
            base_delay,
            max_delay: base_delay.saturating_mul(8),
            max_attempts: self.max_attempts,
        }
    }
}

// ============================================================================
// RetrieverConfig
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Documents returned per request.
    pub top_k: usize,
    /// Minimum final score, in [0,1].
    #[serde(alias = "score")]
    pub score_threshold: f64,
    /// Fan out over rewritten queries.
    pub enable_rewrite: bool,
    /// Rewrite phrasings to request, at most [`MAX_REWRITE_ATTEMPTS`].
    pub rewrite_attempts: usize,
    /// Strategy used when the request does not name one.
    pub retrieve_mode: RetrieveMode,
    /// Rerank vs BM25 mixing weight, in [0,1].
    pub rerank_weight: f64,

    pub candidates: CandidateConfig,
    pub sub_chunk: SubChunkConfig,
    pub bm25: Bm25Params,
    pub rerank: RerankConfig,
    pub rewrite: RewriteConfig,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: 0.2,
            enable_rewrite: false,
            rewrite_attempts: 3,
            retrieve_mode: RetrieveMode::Rerank,
            rerank_weight: 1.0,
            candidates: CandidateConfig::default(),
            sub_chunk: SubChunkConfig::default(),
            bm25: Bm25Params::default(),
            rerank: RerankConfig::default(),
            rewrite: RewriteConfig::default(),
        }
    }
}

impl RetrieverConfig {
    /// Load configuration from the default location.
    ///
    /// Searches in order:
    /// 1. `EDGEQUAKE_RETRIEVER_CONFIG` environment variable
    /// 2. `./retriever.toml`
    /// 3. `~/.edgequake/retriever.toml`
    /// 4. Built-in defaults
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if Path::new(&path).exists() {
                return Self::from_file(&path);
            }
        }

        let local_path = Path::new(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Self::from_file(local_path);
        }

        if let Some(home) = dirs::home_dir() {
            let user_path = home.join(".edgequake").join(CONFIG_FILE_NAME);
            if user_path.exists() {
                return Self::from_file(&user_path);
            }
        }

        Ok(Self::default())
    }

    /// Load and validate configuration from a specific file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            RetrievalError::ConfigError(format!("Failed to parse TOML config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            RetrievalError::ConfigError(format!("Failed to serialize config: {}", e))
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RetrievalError::ConfigError(
                "top_k must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(RetrievalError::ConfigError(format!(
                "score_threshold must be within [0, 1], got {}",
                self.score_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.rerank_weight) {
            return Err(RetrievalError::ConfigError(format!(
                "rerank_weight must be within [0, 1], got {}",
                self.rerank_weight
            )));
        }
        if self.candidates.overfetch_factor == 0 || self.candidates.rrf_rerank_factor == 0 {
            return Err(RetrievalError::ConfigError(
                "candidate factors must be greater than 0".to_string(),
            ));
        }
        if self.rewrite_attempts > MAX_REWRITE_ATTEMPTS {
            return Err(RetrievalError::ConfigError(format!(
                "rewrite_attempts must be at most {}, got {}",
                MAX_REWRITE_ATTEMPTS, self.rewrite_attempts
            )));
        }
        if self.candidates.rrf_k < 1.0 {
            return Err(RetrievalError::ConfigError(format!(
                "rrf_k must be at least 1, got {}",
                self.candidates.rrf_k
            )));
        }
        if self.bm25.k1 < 0.0 || !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(RetrievalError::ConfigError(format!(
                "invalid bm25 parameters k1={} b={}",
                self.bm25.k1, self.bm25.b
            )));
        }
        self.sub_chunk.validate()
    }
}
