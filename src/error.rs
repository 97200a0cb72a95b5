//! Retrieval error types with retry strategies.
//!
//! # Error Taxonomy
//!
//! | Error | Stage | Cause |
//! |-------|-------|-------|
//! | `InvalidRequest` | request | Missing query / knowledge id, out-of-range override |
//! | `Search` | search | Similarity search backend failed |
//! | `Rerank` | rerank | A rerank batch failed (whole rerank call is void) |
//! | `Rewrite` | rewrite | Query rewrite collaborator failed |
//! | `NetworkError` / `ApiError` / `Timeout` | transport | Remote endpoint problems |
//! | `ConfigError` | config | Bad or missing configuration |
//! | `Cancelled` | cancelled | The request's cancellation token fired |
//!
//! # Retry Strategies
//!
//! Each error maps to a [`RetryStrategy`]. Only transport-level and
//! collaborator failures are retryable; invalid input, configuration
//! problems and cancellation never are.

use std::time::Duration;
use thiserror::Error;

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

// ============================================================================
// Retry Strategy
// ============================================================================

/// Strategy for retrying a failed remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff (for transient errors).
    ExponentialBackoff {
        /// Initial delay before first retry.
        base_delay: Duration,
        /// Maximum delay between retries.
        max_delay: Duration,
        /// Maximum number of attempts, including the first one.
        max_attempts: u32,
    },

    /// Wait for a specific duration then retry once.
    WaitAndRetry {
        /// Duration to wait before retrying.
        wait: Duration,
    },

    /// Do not retry at all (permanent error).
    NoRetry,
}

impl RetryStrategy {
    /// Standard exponential backoff for network errors.
    pub fn network_backoff() -> Self {
        Self::ExponentialBackoff {
            base_delay: Duration::from_millis(125),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }

    /// Standard exponential backoff for server errors.
    pub fn server_backoff() -> Self {
        Self::ExponentialBackoff {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 3,
        }
    }

    /// Check if this strategy allows retrying.
    pub fn should_retry(&self) -> bool {
        !matches!(self, Self::NoRetry)
    }

    /// Pause before call number `next` (2 is the first retry), or `None`
    /// once the strategy allows no further call.
    ///
    /// Backoff doubles from `base_delay` and is capped at `max_delay`.
    pub fn delay_before(&self, next: u32) -> Option<Duration> {
        match *self {
            Self::NoRetry => None,
            Self::WaitAndRetry { wait } => (next == 2).then_some(wait),
            Self::ExponentialBackoff {
                base_delay,
                max_delay,
                max_attempts,
            } => {
                if next < 2 || next > max_attempts {
                    return None;
                }
                let doublings = (next - 2).min(31);
                Some(base_delay.saturating_mul(1u32 << doublings).min(max_delay))
            }
        }
    }
}

// ============================================================================
// Retrieval Error Types
// ============================================================================

/// Errors that can occur while retrieving documents.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Request rejected before dispatch.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Similarity search failed.
    #[error("Similarity search failed: {0}")]
    Search(String),

    /// Rerank failed. `batch` is the sub-chunk batch that failed, if known.
    #[error("Rerank failed{}: {message}", batch_suffix(.batch))]
    Rerank {
        batch: Option<usize>,
        message: String,
    },

    /// Query rewrite failed.
    #[error("Query rewrite failed: {0}")]
    Rewrite(String),

    /// Network error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Non-success response from a remote endpoint.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Timeout error.
    #[error("Request timed out")]
    Timeout,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The caller cancelled the request.
    #[error("Retrieval cancelled")]
    Cancelled,

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

fn batch_suffix(batch: &Option<usize>) -> String {
    batch.map(|b| format!(" (batch {})", b)).unwrap_or_default()
}

impl From<reqwest::Error> for RetrievalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RetrievalError::Timeout
        } else if err.is_connect() {
            RetrievalError::NetworkError(format!("Connection failed: {}", err))
        } else {
            RetrievalError::NetworkError(err.to_string())
        }
    }
}

impl RetrievalError {
    /// Build a rerank error for a given batch.
    pub fn rerank_batch(batch: usize, message: impl Into<String>) -> Self {
        Self::Rerank {
            batch: Some(batch),
            message: message.into(),
        }
    }

    /// Build a rerank error not tied to a batch.
    pub fn rerank(message: impl Into<String>) -> Self {
        Self::Rerank {
            batch: None,
            message: message.into(),
        }
    }

    /// Name of the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "request",
            Self::Search(_) => "search",
            Self::Rerank { .. } => "rerank",
            Self::Rewrite(_) => "rewrite",
            Self::NetworkError(_)
            | Self::ApiError { .. }
            | Self::Timeout
            | Self::SerializationError(_) => "transport",
            Self::ConfigError(_) => "config",
            Self::Cancelled => "cancelled",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Get the appropriate retry strategy for this error.
    ///
    /// ```
    /// use edgequake_retrieval::{RetrievalError, RetryStrategy};
    ///
    /// let error = RetrievalError::NetworkError("connection reset".to_string());
    /// assert!(error.retry_strategy().should_retry());
    /// assert_eq!(RetrievalError::Cancelled.retry_strategy(), RetryStrategy::NoRetry);
    /// ```
    pub fn retry_strategy(&self) -> RetryStrategy {
        match self {
            Self::NetworkError(_) | Self::Timeout => RetryStrategy::network_backoff(),

            Self::ApiError { status: 429, .. } => RetryStrategy::WaitAndRetry {
                wait: Duration::from_secs(10),
            },
            Self::ApiError { status, .. } if *status >= 500 => RetryStrategy::server_backoff(),

            Self::Search(_) | Self::Rerank { .. } | Self::Rewrite(_) => {
                RetryStrategy::ExponentialBackoff {
                    base_delay: Duration::from_millis(300),
                    max_delay: Duration::from_secs(5),
                    max_attempts: 3,
                }
            }

            Self::InvalidRequest(_)
            | Self::ConfigError(_)
            | Self::Cancelled
            | Self::ApiError { .. }
            | Self::SerializationError(_)
            | Self::Unknown(_) => RetryStrategy::NoRetry,
        }
    }

    /// Check if this error is recoverable (can be retried).
    pub fn is_recoverable(&self) -> bool {
        self.retry_strategy().should_retry()
    }
}
