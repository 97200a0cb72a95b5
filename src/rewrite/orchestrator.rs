//! Query-rewrite fan-out.
//!
//! ```ascii
//!  attempt 1 ──► attempt 2 ──► attempt 3        serial, each sees `used`
//!     │             │             │
//!     ▼             ▼             ▼
//!  branch 1      branch 2      branch 3          concurrent strategies
//!     │             │             │
//!     └─────────────┼─────────────┘
//!                   ▼
//!        DashMap<id, best Document>              keep higher score
//!                   │
//!        sort (score desc, id asc), top_k
//! ```
//!
//! A failed rewrite attempt is skipped; if none succeeds the original query
//! is searched alone. A failed branch is logged and contributes nothing. Only
//! when every branch fails does the orchestrator fail, with the last error.
//! Cancellation is not a failure: a cancelled rewrite or branch ends the run
//! with [`RetrievalError::Cancelled`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

use super::traits::QueryRewriter;
use crate::error::{Result, RetrievalError, RetryStrategy};
use crate::retry::RetryExecutor;
use crate::strategy::StrategyExecutor;
use crate::types::{Document, ResolvedRequest};

/// Fans a request out over several phrasings and merges the results.
#[derive(Clone)]
pub struct RewriteOrchestrator {
    rewriter: Arc<dyn QueryRewriter>,
    retry: RetryStrategy,
}

impl std::fmt::Debug for RewriteOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteOrchestrator")
            .field("rewriter", &self.rewriter.name())
            .field("retry", &self.retry)
            .finish()
    }
}

impl RewriteOrchestrator {
    /// `retry` governs each individual rewrite call.
    pub fn new(rewriter: Arc<dyn QueryRewriter>, retry: RetryStrategy) -> Self {
        Self { rewriter, retry }
    }

    /// Ask the rewriter for `request.rewrite_attempts` phrasings, one after
    /// another.
    ///
    /// Never empty: falls back to the original query when every attempt
    /// fails. A cancelled attempt stops the loop and returns
    /// [`RetrievalError::Cancelled`].
    pub async fn generate_phrasings(&self, request: &ResolvedRequest) -> Result<Vec<String>> {
        let executor = RetryExecutor::new("rewrite");
        let mut used = String::new();
        let mut phrasings = Vec::new();

        for attempt in 1..=request.rewrite_attempts {
            let rewriter = self.rewriter.as_ref();
            let used_so_far = used.as_str();
            let outcome = executor
                .execute(&self.retry, || async move {
                    let phrasing = rewriter
                        .generate(used_so_far, &request.query, &request.knowledge_id)
                        .await?;
                    let phrasing = phrasing.trim();
                    if phrasing.is_empty() {
                        return Err(RetrievalError::Rewrite("blank rewrite output".to_string()));
                    }
                    Ok(phrasing.to_string())
                })
                .instrument(info_span!("rewrite_attempt", attempt))
                .await;

            match outcome {
                Ok(phrasing) => {
                    info!(attempt, phrasing = %phrasing, "Rewrite attempt succeeded");
                    used.push_str(&phrasing);
                    used.push(' ');
                    phrasings.push(phrasing);
                }
                Err(RetrievalError::Cancelled) => return Err(RetrievalError::Cancelled),
                Err(e) => warn!(attempt, error = %e, "Rewrite attempt failed, skipping"),
            }
        }

        if phrasings.is_empty() {
            warn!("No rewritten queries generated, using original query");
            phrasings.push(request.query.clone());
        }
        Ok(phrasings)
    }

    /// Rewrite, run `strategy` once per phrasing concurrently, and merge.
    pub async fn run(
        &self,
        strategy: &StrategyExecutor,
        request: &ResolvedRequest,
    ) -> Result<Vec<Document>> {
        let phrasings = self.generate_phrasings(request).await?;
        let merged: DashMap<String, Document> = DashMap::new();

        let branches = phrasings.iter().enumerate().map(|(branch, phrasing)| {
            let branch_request = request.with_optimized_query(phrasing.as_str());
            let merged = &merged;
            let span = info_span!("rewrite_branch", branch, query = %phrasing);
            async move {
                match strategy.execute(&branch_request).await {
                    Ok(docs) => {
                        for doc in docs {
                            merge_best(merged, doc);
                        }
                        Ok(())
                    }
                    Err(RetrievalError::Cancelled) => Err(RetrievalError::Cancelled),
                    Err(e) => {
                        warn!(error = %e, stage = e.stage(), "Rewrite branch failed");
                        Err(e)
                    }
                }
            }
            .instrument(span)
        });
        let outcomes = join_all(branches).await;
        if outcomes
            .iter()
            .any(|o| matches!(o, Err(RetrievalError::Cancelled)))
        {
            return Err(RetrievalError::Cancelled);
        }

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        if failed == outcomes.len() {
            if let Some(Err(last)) = outcomes.into_iter().last() {
                return Err(last);
            }
        }

        let mut docs: Vec<Document> = merged.into_iter().map(|(_, doc)| doc).collect();
        docs.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        docs.truncate(request.top_k);

        info!(
            branches = phrasings.len(),
            failed_branches = failed,
            returned = docs.len(),
            "Rewrite branches merged"
        );
        Ok(docs)
    }
}

/// Insert `doc`, or replace the stored copy if `doc` scores higher.
///
/// The entry guard holds the shard lock across compare and replace.
pub(crate) fn merge_best(merged: &DashMap<String, Document>, doc: Document) {
    match merged.entry(doc.id.clone()) {
        Entry::Occupied(mut existing) => {
            if doc.score > existing.get().score {
                existing.insert(doc);
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(doc);
        }
    }
}
