//! Provider-agnostic protocol types and the backend trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Backend, FinishReason, Message, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolResult,
    Usage,
};
