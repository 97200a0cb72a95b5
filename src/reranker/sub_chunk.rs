//! Sliding-window sub-chunk reranking.
//!
//! Rerank endpoints score short passages well and long ones poorly. This
//! layer cuts every candidate into overlapping windows, scores all windows
//! in concurrent batches, then folds the window scores back into one score
//! per document.
//!
//! # Flow
//!
//! ```ascii
//! docs ──► split_into_sub_chunks ──► flat window list (+ owner index)
//!                                          │
//!                          chunks of batch_size (30)
//!                                          │
//!              ┌───────────────┬───────────┴───────────┐
//!              ▼               ▼                       ▼
//!          batch 0         batch 1        ...      batch n     (concurrent,
//!              │               │                       │        fail fast)
//!              └───────────────┴───────────┬───────────┘
//!                                          ▼
//!                      slots[global window index] = score
//!                                          │
//!                group by owner ─► relative filter ─► aggregate
//!                                          │
//!                              sort desc, truncate top_k
//! ```

use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::config::{AggregateStrategy, SubChunkConfig};
use super::traits::Reranker;
use crate::error::{Result, RetrievalError};
use crate::types::{sort_by_score_desc, Document};

/// Split `content` into windows of `size` characters sharing `overlap`
/// characters with their predecessor.
///
/// Counts Unicode scalar values, never bytes, so multi-byte text is never
/// cut mid-character. Empty content has no windows. Content of at most
/// `size` characters is a single window. The last window always ends at the
/// end of the content unless `max_windows` (0 = unlimited) stops it first.
pub fn split_into_sub_chunks(
    content: &str,
    size: usize,
    overlap: usize,
    max_windows: usize,
) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = content.chars().collect();
    let len = chars.len();
    if size == 0 || len <= size {
        return vec![content.to_string()];
    }

    let step = if overlap >= size { size } else { size - overlap };

    let mut windows = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        windows.push(chars[start..end].iter().collect());

        if end >= len {
            break;
        }
        if max_windows > 0 && windows.len() >= max_windows {
            break;
        }
        start += step;
    }
    windows
}

/// Keep windows scoring at least `max * threshold`.
///
/// A non-positive threshold or a zero max leaves the scores untouched. If
/// nothing survives, the single best score is kept.
pub fn filter_low_score_windows(scores: &[f64], threshold: f64) -> Vec<f64> {
    if scores.is_empty() || threshold <= 0.0 {
        return scores.to_vec();
    }

    let max = max_score(scores);
    if max == 0.0 {
        return scores.to_vec();
    }

    let cutoff = max * threshold;
    let filtered: Vec<f64> = scores.iter().copied().filter(|s| *s >= cutoff).collect();
    if filtered.is_empty() {
        vec![max]
    } else {
        filtered
    }
}

/// Collapse window scores into one document score. Empty input scores 0.
pub fn aggregate_scores(scores: &[f64], strategy: AggregateStrategy, top_k_for_mean: usize) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }

    match strategy {
        AggregateStrategy::Max => max_score(scores),
        AggregateStrategy::Mean => scores.iter().sum::<f64>() / scores.len() as f64,
        AggregateStrategy::TopKMean => {
            let k = if top_k_for_mean == 0 { 2 } else { top_k_for_mean };
            let mut sorted = scores.to_vec();
            sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            let k = k.min(sorted.len());
            sorted[..k].iter().sum::<f64>() / k as f64
        }
    }
}

fn max_score(scores: &[f64]) -> f64 {
    scores[1..].iter().copied().fold(scores[0], f64::max)
}

/// Document-level reranker built on a passage-level [`Reranker`].
///
/// # Example
///
/// ```ignore
/// use edgequake_retrieval::reranker::{SubChunkConfig, SubChunkReranker};
///
/// let sub_chunk = SubChunkReranker::new(Arc::new(http_reranker));
/// let ranked = sub_chunk
///     .rerank_with_sub_chunks("fsdp sharding", candidates, 5, &SubChunkConfig::default())
///     .await?;
/// ```
#[derive(Clone)]
pub struct SubChunkReranker {
    reranker: Arc<dyn Reranker>,
}

impl std::fmt::Debug for SubChunkReranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubChunkReranker")
            .field("reranker", &self.reranker.name())
            .field("model", &self.reranker.model())
            .finish()
    }
}

impl SubChunkReranker {
    pub fn new(reranker: Arc<dyn Reranker>) -> Self {
        Self { reranker }
    }

    /// The passage-level reranker underneath.
    pub fn inner(&self) -> &Arc<dyn Reranker> {
        &self.reranker
    }

    /// Rescore `docs` against `query` and return the best `top_k`, highest
    /// first. `top_k == 0` keeps everything.
    ///
    /// Any batch failure fails the whole call; no partial scores are
    /// returned.
    pub async fn rerank_with_sub_chunks(
        &self,
        query: &str,
        docs: Vec<Document>,
        top_k: usize,
        config: &SubChunkConfig,
    ) -> Result<Vec<Document>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let default_config;
        let config = if config.sub_chunk_size == 0 {
            default_config = SubChunkConfig::default();
            &default_config
        } else {
            config
        };
        let batch_size = config.batch_size.max(1);

        // Flatten windows; owners[i] is the doc position of window i.
        let mut windows: Vec<String> = Vec::new();
        let mut owners: Vec<usize> = Vec::new();
        for (position, doc) in docs.iter().enumerate() {
            let doc_windows = split_into_sub_chunks(
                &doc.content,
                config.sub_chunk_size,
                config.overlap_size,
                config.max_sub_chunks_per_doc,
            );
            owners.extend(std::iter::repeat(position).take(doc_windows.len()));
            windows.extend(doc_windows);
        }

        let batch_count = windows.len().div_ceil(batch_size);
        info!(
            documents = docs.len(),
            windows = windows.len(),
            batches = batch_count,
            reranker = self.reranker.name(),
            "Sub-chunk rerank"
        );

        let batches = windows
            .chunks(batch_size)
            .enumerate()
            .map(|(batch_idx, batch)| self.score_batch(query, batch_idx, batch_idx * batch_size, batch));
        let batch_results = try_join_all(batches).await?;

        // Every slot is written by exactly one batch, after all batches finished.
        let mut slots: Vec<Option<f64>> = vec![None; windows.len()];
        for scored in batch_results {
            for (global_idx, score) in scored {
                slots[global_idx] = Some(score);
            }
        }

        let mut per_doc: Vec<Vec<f64>> = vec![Vec::new(); docs.len()];
        for (global_idx, score) in slots.into_iter().enumerate() {
            if let Some(score) = score {
                per_doc[owners[global_idx]].push(score);
            }
        }

        let mut ranked: Vec<Document> = docs
            .into_iter()
            .zip(per_doc)
            .map(|(mut doc, scores)| {
                let kept = filter_low_score_windows(&scores, config.score_threshold);
                doc.score =
                    aggregate_scores(&kept, config.aggregate_strategy, config.top_k_for_mean);
                doc
            })
            .collect();

        sort_by_score_desc(&mut ranked);
        if top_k > 0 {
            ranked.truncate(top_k);
        }

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            returned = ranked.len(),
            "Sub-chunk rerank complete"
        );
        Ok(ranked)
    }

    /// Score one batch, returning `(global window index, score)` pairs.
    async fn score_batch(
        &self,
        query: &str,
        batch_idx: usize,
        offset: usize,
        batch: &[String],
    ) -> Result<Vec<(usize, f64)>> {
        let results = self
            .reranker
            .rerank(query, batch, Some(batch.len()))
            .await
            .map_err(|e| match e {
                RetrievalError::Cancelled => RetrievalError::Cancelled,
                other => RetrievalError::rerank_batch(batch_idx, other.to_string()),
            })?;

        results
            .into_iter()
            .map(|r| {
                if r.index >= batch.len() {
                    Err(RetrievalError::rerank_batch(
                        batch_idx,
                        format!("result index {} out of range for {} windows", r.index, batch.len()),
                    ))
                } else {
                    Ok((offset + r.index, r.relevance_score))
                }
            })
            .collect()
    }
}
