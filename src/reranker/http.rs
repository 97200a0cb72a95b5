//! HTTP-based reranker implementation.
//!
//! Talks to any rerank endpoint that speaks the common
//! `{query, documents, top_n}` dialect, plus Aliyun DashScope's wrapped
//! variant.
//!
//! # Wire Formats
//!
//! | Format | Request | Response |
//! |----------|---------|----------|
//! | Standard | `{model, query, documents, top_n, return_documents}` | `{results: [{index, relevance_score}]}` |
//! | Aliyun | `{model, input: {query, documents}, parameters}` | `{output: {results: [...]}}` |

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::config::RerankConfig;
use super::traits::{RerankResult, Reranker};
use crate::error::{Result, RetrievalError};

/// HTTP-based reranker.
///
/// # Architecture
///
/// ```ascii
/// ┌────────────────┐    HTTP     ┌─────────────────┐
/// │  HttpReranker  │ ─────────►  │  Rerank API     │
/// │                │  Bearer key │  (POST /rerank) │
/// └────────┬───────┘             └────────┬────────┘
///          │                              │
///          │   RerankConfig               │  JSON Response
///          │   - model                    │  - results[]
///          │   - base_url                 │    - index
///          │   - api_key                  │    - relevance_score
///          └──────────────────────────────┘
/// ```
#[derive(Debug, Clone)]
pub struct HttpReranker {
    client: Client,
    config: RerankConfig,
    endpoint: String,
    format: WireFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireFormat {
    Standard,
    Aliyun,
}

/// `{"error": {"message": "..."}}` error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpReranker {
    /// Create a reranker from `config`, filling key and URL from the
    /// environment when they are missing.
    pub fn new(config: RerankConfig) -> Result<Self> {
        let config = config.resolve_env()?;
        let endpoint = config.endpoint().ok_or_else(|| {
            RetrievalError::ConfigError("rerank base_url is required".to_string())
        })?;
        let format = if endpoint.contains("dashscope.aliyuncs.com") {
            WireFormat::Aliyun
        } else {
            WireFormat::Standard
        };

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                RetrievalError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            endpoint,
            format,
        })
    }

    /// Resolved endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(
        &self,
        query: &str,
        passages: &[String],
        top_n: Option<usize>,
    ) -> serde_json::Value {
        let top_n = top_n.unwrap_or(passages.len());
        match self.format {
            WireFormat::Standard => serde_json::json!({
                "model": self.config.model,
                "query": query,
                "documents": passages,
                "top_n": top_n,
                "return_documents": false,
            }),
            WireFormat::Aliyun => serde_json::json!({
                "model": self.config.model,
                "input": {
                    "query": query,
                    "documents": passages,
                },
                "parameters": {
                    "top_n": top_n,
                    "return_documents": false,
                },
            }),
        }
    }

    fn parse_response(
        &self,
        response: serde_json::Value,
        passage_count: usize,
    ) -> Result<Vec<RerankResult>> {
        let results = match self.format {
            WireFormat::Standard => response.get("results"),
            WireFormat::Aliyun => response.get("output").and_then(|o| o.get("results")),
        }
        .and_then(|r| r.as_array())
        .cloned()
        .unwrap_or_default();

        if results.is_empty() {
            warn!("Rerank API returned empty results");
            return Ok(vec![]);
        }

        let mut rerank_results = Vec::with_capacity(results.len());
        for result in results {
            let index = result
                .get("index")
                .and_then(|i| i.as_u64())
                .ok_or_else(|| RetrievalError::rerank("missing index in rerank result"))?
                as usize;
            if index >= passage_count {
                return Err(RetrievalError::rerank(format!(
                    "result index {} out of range for {} passages",
                    index, passage_count
                )));
            }
            let relevance_score = result
                .get("relevance_score")
                .and_then(|s| s.as_f64())
                .ok_or_else(|| RetrievalError::rerank("missing relevance_score in rerank result"))?;

            rerank_results.push(RerankResult {
                index,
                relevance_score,
            });
        }

        Ok(rerank_results)
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn name(&self) -> &str {
        match self.format {
            WireFormat::Aliyun => "aliyun",
            WireFormat::Standard => "http",
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn rerank(
        &self,
        query: &str,
        passages: &[String],
        top_n: Option<usize>,
    ) -> Result<Vec<RerankResult>> {
        if passages.is_empty() {
            return Ok(vec![]);
        }

        let payload = self.build_request(query, passages, top_n);

        debug!(
            "Rerank request: {} passages, model: {}",
            passages.len(),
            self.config.model
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(RetrievalError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            RetrievalError::rerank(format!("failed to parse rerank response: {}", e))
        })?;

        self.parse_response(response_json, passages.len())
    }
}
