//! EdgeQuake Retrieval - Knowledge-Base Retrieval Orchestration
//!
//! This crate turns a question into a ranked list of knowledge-base chunks:
//! - Three retrieval modes (vector, rerank, reciprocal rank fusion)
//! - Sliding-window sub-chunk reranking with concurrent batches
//! - BM25 lexical scoring and weighted rerank/BM25 fusion
//! - Query-rewrite fan-out with a concurrent best-score merge
//!
//! # Modes
//!
//! | Mode | Search | Rerank | Fusion |
//! |------|--------|--------|--------|
//! | `vector` | top_k | - | - |
//! | `rerank` | max(top_k×3, 15) | sub-chunk | optional BM25 blend |
//! | `rrf` | 2 passes | pass 2, top_k×2 | RRF k=60 |
//!
//! The vector store, the rerank endpoint and the rewrite model are
//! collaborators behind traits ([`SimilaritySearch`], [`Reranker`],
//! [`QueryRewriter`]); [`HttpReranker`] and [`LlmQueryRewriter`] are the
//! bundled implementations and [`mock`] holds deterministic test doubles.
//!
//! # Example
//!
//! ```ignore
//! use edgequake_retrieval::{RetrieveMode, RetrieveRequest, Retriever, RetrieverConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let retriever = Retriever::from_config(RetrieverConfig::load()?, vector_store)?;
//! let request = RetrieveRequest::new("how does fsdp shard parameters", "kb_ml")
//!     .with_mode(RetrieveMode::Rrf);
//! let docs = retriever.retrieve(&request, &CancellationToken::new()).await?;
//! ```
//!
//! # See Also
//!
//! - [`crate::reranker`] for scoring and fusion building blocks
//! - [`crate::rewrite`] for the rewrite fan-out
//! - [`crate::config`] for configuration loading

pub mod config;
pub mod error;
pub mod mock;
pub mod reranker;
pub mod retriever;
pub mod retry;
pub mod rewrite;
pub mod search;
pub mod strategy;
pub mod types;

pub use config::{CandidateConfig, RetrieverConfig, RewriteConfig};
pub use error::{Result, RetrievalError, RetryStrategy};
pub use reranker::{
    AggregateStrategy, Bm25Params, Bm25Scorer, HttpReranker, RerankConfig, RerankResult,
    Reranker, RrfFusion, SubChunkConfig, SubChunkReranker, WeightedFusion,
};
pub use retriever::Retriever;
pub use retry::RetryExecutor;
pub use rewrite::{ChatCompletion, LlmQueryRewriter, QueryRewriter, RewriteOrchestrator, RewritePrompt};
pub use search::{SearchQuery, SimilaritySearch};
pub use strategy::StrategyExecutor;
pub use types::{Document, ResolvedRequest, RetrieveMode, RetrieveRequest, MAX_REWRITE_ATTEMPTS};
