//! Query rewriter backed by a chat model.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::prompt::RewritePrompt;
use super::traits::{ChatCompletion, QueryRewriter};
use crate::error::{Result, RetrievalError};

/// Asks a [`ChatCompletion`] model for search keywords.
#[derive(Clone)]
pub struct LlmQueryRewriter {
    chat: Arc<dyn ChatCompletion>,
}

impl std::fmt::Debug for LlmQueryRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmQueryRewriter")
            .field("model", &self.chat.model())
            .finish()
    }
}

impl LlmQueryRewriter {
    pub fn new(chat: Arc<dyn ChatCompletion>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl QueryRewriter for LlmQueryRewriter {
    fn name(&self) -> &str {
        "llm"
    }

    async fn generate(&self, used: &str, query: &str, knowledge_id: &str) -> Result<String> {
        let prompt = RewritePrompt::build(used, query, knowledge_id);
        let answer = self.chat.complete(&prompt.system, &prompt.user).await?;
        let answer = answer.trim();

        if answer.is_empty() {
            return Err(RetrievalError::Rewrite(format!(
                "model {} returned an empty rewrite",
                self.chat.model()
            )));
        }

        debug!(model = self.chat.model(), phrasing = answer, "Query rewritten");
        Ok(answer.to_string())
    }
}
