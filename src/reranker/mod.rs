//! Reranking and score fusion.
//!
//! Everything that turns a candidate list into a better-ordered one lives
//! here: the passage-level remote reranker, the sliding-window layer on top
//! of it, the local BM25 scorer, and the two fusion schemes.
//!
//! # Architecture
//!
//! ```ascii
//!                    ┌─────────────────────────────┐
//!                    │   Query + Candidate Docs    │
//!                    └──────────────┬──────────────┘
//!                                   │
//!        ┌──────────────────────────┼───────────────────────┐
//!        ▼                          ▼                       ▼
//! ┌──────────────────┐     ┌──────────────┐        ┌──────────────┐
//! │ SubChunkReranker │     │  Bm25Scorer  │        │  RrfFusion   │
//! │ windows → batches│     │   (local)    │        │ (rank-based) │
//! └────────┬─────────┘     └──────┬───────┘        └──────────────┘
//!          │                      │
//!          ▼                      │
//! ┌──────────────────┐            │
//! │  Reranker trait  │            │
//! │  (HttpReranker)  │            │
//! └────────┬─────────┘            │
//!          └──────────┬───────────┘
//!                     ▼
//!            ┌──────────────────┐
//!            │  WeightedFusion  │
//!            └──────────────────┘
//! ```
//!
//! # Module Structure
//!
//! ```ascii
//! reranker/
//! ├── mod.rs         ─► This file (re-exports)
//! ├── config.rs      ─► RerankConfig, SubChunkConfig, AggregateStrategy
//! ├── traits.rs      ─► Reranker trait, RerankResult
//! ├── http.rs        ─► HttpReranker (standard + DashScope wire formats)
//! ├── sub_chunk.rs   ─► SubChunkReranker, window split / filter / aggregate
//! ├── bm25.rs        ─► Bm25Scorer, tokenize, normalize_scores
//! ├── rrf.rs         ─► RrfFusion
//! └── hybrid.rs      ─► WeightedFusion, score_lexical
//! ```

mod bm25;
mod config;
mod http;
mod hybrid;
mod rrf;
mod sub_chunk;
mod traits;

pub use bm25::{normalize_scores, tokenize, Bm25Params, Bm25Scorer};
pub use config::{
    AggregateStrategy, RerankConfig, SubChunkConfig, DEFAULT_RERANK_MODEL, RERANK_API_KEY_ENV,
    RERANK_BASE_URL_ENV,
};
pub use http::HttpReranker;
pub use hybrid::{score_lexical, WeightedFusion, WEIGHT_EPSILON};
pub use rrf::{RrfFusion, DEFAULT_RRF_K};
pub use sub_chunk::{
    aggregate_scores, filter_low_score_windows, split_into_sub_chunks, SubChunkReranker,
};
pub use traits::{RerankResult, Reranker};

#[cfg(test)]
mod tests;
