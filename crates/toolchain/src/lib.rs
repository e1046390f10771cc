//! LLM toolchain: prompts in, tool-using model answers out.
//!
//! This crate connects a chat model to a set of callable tools and runs the
//! call-tool-reply loop until the model produces a final answer.
//!
//! # Overview
//!
//! - **Backend**: a trait over LLM providers. [`OpenAiBackend`], [`GenAiBackend`]
//!   (Gemini with an API key) and [`VertexAiBackend`] (Gemini on Vertex AI)
//!   implement it; [`AnyBackend`] picks one at runtime.
//! - **ToolHost**: runs model tool calls, checking each one against a
//!   capability [`Policy`](policy::Policy) and a timeout.
//! - **SemanticToolSelector**: offers only the tools whose descriptions match
//!   the prompt.
//! - **Toolchain**: the loop itself, with optional history and an event log.
//!
//! # Example
//!
//! ```no_run
//! use toolchain::{OpenAiBackend, SemanticToolSelector, Toolchain};
//!
//! # async fn example() -> toolchain::Result<()> {
//! let backend = OpenAiBackend::builder("sk-...").build();
//! let selector = SemanticToolSelector::new(tools::builtin::all());
//!
//! let mut chain = Toolchain::builder(backend)
//!     .selector(selector)
//!     .policy(policy::Policy::standard())
//!     .build()?;
//!
//! let answer = chain.run("What's the weather in New York City?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

mod chain;
mod error;
mod host;
pub mod model;
pub mod providers;
mod recorder;
pub mod selector;

pub use chain::{DEFAULT_MAX_ITERATIONS, RunReport, ToolInvocation, Toolchain, ToolchainBuilder};
pub use error::{Error, Result};
pub use host::{DEFAULT_TOOL_TIMEOUT, ToolHost};
pub use model::{
    Backend, FinishReason, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall,
    ToolResult, Usage,
};
pub use providers::{AnyBackend, GenAiBackend, OpenAiBackend, VertexAiBackend, VertexAuth};
pub use recorder::Recorder;
pub use selector::{Embedder, LexicalEmbedder, OpenAiEmbedder, ScoredTool, SemanticToolSelector};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.split('.').count() >= 2);
    }
}
