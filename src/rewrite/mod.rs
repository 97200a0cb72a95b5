//! Query rewriting.
//!
//! # Module Structure
//!
//! ```ascii
//! rewrite/
//! ├── mod.rs          ─► This file (re-exports)
//! ├── traits.rs       ─► QueryRewriter, ChatCompletion
//! ├── prompt.rs       ─► RewritePrompt
//! ├── llm.rs          ─► LlmQueryRewriter
//! └── orchestrator.rs ─► RewriteOrchestrator (serial rewrite, concurrent branches)
//! ```

mod llm;
mod orchestrator;
mod prompt;
mod traits;

pub use llm::LlmQueryRewriter;
pub use orchestrator::RewriteOrchestrator;
pub use prompt::RewritePrompt;
pub use traits::{ChatCompletion, QueryRewriter};
