//! Retrieval entry point.
//!
//! # Architecture
//!
//! ```ascii
//!  RetrieveRequest ──resolve(config)──► ResolvedRequest
//!                                           │
//!                        enable_rewrite? ───┤
//!                  no ┌─────────────────────┴─────────────────┐ yes
//!                     ▼                                       ▼
//!          StrategyExecutor::execute              RewriteOrchestrator::run
//!                     │                                       │
//!                     └──────────────┬────────────────────────┘
//!                                    ▼
//!                     raced against CancellationToken
//! ```

use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::RetrieverConfig;
use crate::error::{Result, RetrievalError};
use crate::reranker::{HttpReranker, Reranker};
use crate::rewrite::{QueryRewriter, RewriteOrchestrator};
use crate::search::SimilaritySearch;
use crate::strategy::StrategyExecutor;
use crate::types::{Document, ResolvedRequest, RetrieveRequest};

/// Knowledge-base retriever.
///
/// # Example
///
/// ```ignore
/// use edgequake_retrieval::{RetrieveRequest, Retriever, RetrieverConfig};
/// use tokio_util::sync::CancellationToken;
///
/// let retriever = Retriever::from_config(RetrieverConfig::load()?, vector_store)?
///     .with_rewriter(llm_rewriter);
/// let docs = retriever
///     .retrieve(&RetrieveRequest::new("how does fsdp shard", "kb_ml"), &CancellationToken::new())
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Retriever {
    config: Arc<RetrieverConfig>,
    strategy: StrategyExecutor,
    rewrite: Option<RewriteOrchestrator>,
}

impl Retriever {
    /// Build a retriever over the given collaborators.
    pub fn new(
        config: RetrieverConfig,
        search: Arc<dyn SimilaritySearch>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            strategy: StrategyExecutor::new(search, reranker, Arc::clone(&config)),
            config,
            rewrite: None,
        }
    }

    /// Build a retriever whose reranker is the HTTP endpoint in
    /// `config.rerank`.
    pub fn from_config(config: RetrieverConfig, search: Arc<dyn SimilaritySearch>) -> Result<Self> {
        config.validate()?;
        let reranker = HttpReranker::new(config.rerank.clone())?;
        Ok(Self::new(config, search, Arc::new(reranker)))
    }

    /// Enable query rewriting through `rewriter`, retrying each call per
    /// `config.rewrite`.
    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewrite = Some(RewriteOrchestrator::new(
            rewriter,
            self.config.rewrite.retry_strategy(),
        ));
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Retrieve documents for `request`.
    ///
    /// Returns a sorted list, possibly empty when nothing clears the score
    /// threshold, or the error of the stage that failed. Cancelling `cancel`
    /// drops all in-flight work and returns [`RetrievalError::Cancelled`].
    pub async fn retrieve(
        &self,
        request: &RetrieveRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>> {
        let resolved = request.resolve(&self.config)?;
        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(knowledge_id = %resolved.knowledge_id, "Retrieval cancelled");
                Err(RetrievalError::Cancelled)
            }
            result = self.run(&resolved) => result,
        };

        match outcome {
            Ok(ref docs) => info!(
                mode = %resolved.mode,
                rewrite = resolved.enable_rewrite,
                returned = docs.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Retrieval completed"
            ),
            Err(RetrievalError::Cancelled) => {}
            Err(ref e) => error!(
                mode = %resolved.mode,
                stage = e.stage(),
                error = %e,
                "Retrieval failed"
            ),
        }
        outcome
    }

    async fn run(&self, request: &ResolvedRequest) -> Result<Vec<Document>> {
        if !request.enable_rewrite {
            return self.strategy.execute(request).await;
        }

        let orchestrator = self.rewrite.as_ref().ok_or_else(|| {
            RetrievalError::ConfigError(
                "query rewrite requested but no rewriter is configured".to_string(),
            )
        })?;
        orchestrator.run(&self.strategy, request).await
    }
}
