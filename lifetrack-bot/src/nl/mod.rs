//! Natural-language requests translated to GraphQL by a local model.
//!
//! Archived: only wired into the bot when `NL_QUERIES_ENABLED` is set.

pub mod embed;
pub mod explain;
pub mod format;
pub mod generator;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod rag;
pub mod retry;
pub mod schema;

pub use pipeline::NlPipeline;
