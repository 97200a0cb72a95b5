//! Rewrite collaborator traits.

use async_trait::async_trait;

use crate::error::Result;

/// Produces alternative phrasings of a query.
///
/// # Implementations
///
/// - [`super::LlmQueryRewriter`] - Prompted chat model
/// - [`crate::mock::MockQueryRewriter`] - Scripted responses for tests
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    /// Get the name of this rewriter.
    fn name(&self) -> &str;

    /// Generate one alternative phrasing of `query`.
    ///
    /// `used` holds the phrasings produced by earlier attempts, space
    /// separated, so the rewriter can steer away from them. `knowledge_id`
    /// labels the collection being searched.
    async fn generate(&self, used: &str, query: &str, knowledge_id: &str) -> Result<String>;
}

/// Minimal single-turn chat completion.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Get the model being used.
    fn model(&self) -> &str;

    /// Answer `user` under the `system` instructions.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}
