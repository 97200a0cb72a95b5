//! Retry loop for remote collaborator calls.
//!
//! The rewrite orchestrator runs every LLM rewrite through a
//! [`RetryExecutor`] so a flaky call gets a few chances before its attempt
//! is skipped. The pause schedule comes from
//! [`RetryStrategy::delay_before`]; errors that are not recoverable
//! (cancellation included) end the loop at once.
//!
//! # Usage
//!
//! ```ignore
//! use edgequake_retrieval::{RetryExecutor, RetryStrategy};
//!
//! let phrasing = RetryExecutor::new("rewrite")
//!     .execute(&RetryStrategy::network_backoff(), || async {
//!         rewriter.generate(&used, query, knowledge_id).await
//!     })
//!     .await?;
//! ```

use crate::error::{RetrievalError, RetryStrategy};
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Runs one remote call under a [`RetryStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    operation: &'static str,
}

impl RetryExecutor {
    /// `operation` labels every retry log line.
    pub fn new(operation: &'static str) -> Self {
        Self { operation }
    }

    /// Call `call` until it succeeds, returns an unrecoverable error, or the
    /// strategy runs out. The last error is returned in the latter cases.
    pub async fn execute<F, Fut, T>(
        &self,
        strategy: &RetryStrategy,
        mut call: F,
    ) -> Result<T, RetrievalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetrievalError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            let error = match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = self.operation, attempt, "Recovered after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_recoverable() {
                debug!(
                    operation = self.operation,
                    attempt,
                    error = %error,
                    "Unrecoverable error, not retrying"
                );
                return Err(error);
            }

            let Some(delay) = strategy.delay_before(attempt + 1) else {
                if attempt > 1 {
                    warn!(
                        operation = self.operation,
                        attempts = attempt,
                        error = %error,
                        "Retries exhausted"
                    );
                }
                return Err(error);
            };

            warn!(
                operation = self.operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Call failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
