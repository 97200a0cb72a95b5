//! Prompt for keyword-style query rewriting.

use chrono::{DateTime, SecondsFormat, Utc};

/// System / user message pair asking a chat model for search keywords.
///
/// # Example
///
/// ```
/// use edgequake_retrieval::rewrite::RewritePrompt;
///
/// let prompt = RewritePrompt::build("fsdp sharding ", "how does fsdp work", "ml_papers");
/// assert!(prompt.system.contains("fsdp sharding"));
/// assert!(prompt.user.ends_with("how does fsdp work"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewritePrompt {
    pub system: String,
    pub user: String,
}

impl RewritePrompt {
    /// Build the prompt stamped with the current time.
    pub fn build(used: &str, query: &str, knowledge_label: &str) -> Self {
        Self::build_at(Utc::now(), used, query, knowledge_label)
    }

    /// Build the prompt stamped with `now`.
    pub fn build_at(now: DateTime<Utc>, used: &str, query: &str, knowledge_label: &str) -> Self {
        let system = format!(
            "You are an expert at retrieval-augmented search. Understand the user's question, \
then produce the query used for vector search.\n\
Current time: {now}\n\
Rewrite the search query following these rules:\n\
- Based on the question and its context, rewrite the keywords that should be searched.\n\
- If the question involves time, resolve it to concrete dates using the current time.\n\
- Keep it short: usually no more than 3 keywords, never more than 5.\n\
- Return only the optimized search terms, with no explanation.\n\
- Avoid these keywords, earlier searches with them did not return the expected results: {used}\n\
- Avoid keywords contained in the knowledge base name \"{knowledge_label}\".",
            now = now.to_rfc3339_opts(SecondsFormat::Secs, true),
            used = used.trim(),
            knowledge_label = knowledge_label,
        );

        Self {
            system,
            user: format!("The user's question: {}", query),
        }
    }
}
