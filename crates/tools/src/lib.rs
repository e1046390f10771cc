//! Built-in tools for the LLM toolchain.
//!
//! Every tool implements [`Tool`]: a name, a description, a JSON schema for
//! its arguments, the capabilities a call needs, and an async `execute`.
//! Tools run against a shared [`ToolContext`] that carries the working
//! directory, an HTTP client and the service endpoints.
//!
//! ```no_run
//! use tools::{ToolContext, builtin};
//!
//! # async fn example() -> Result<(), tools::ToolError> {
//! let ctx = ToolContext::new(".");
//! let convert = builtin::by_names(&["convert_units"])?.remove(0);
//! let out = convert
//!     .execute(serde_json::json!({"value": 10, "from_unit": "km", "to_unit": "mi"}), &ctx)
//!     .await?;
//! println!("{out}");
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod builtin;
mod context;
mod error;
mod spec;
mod tool;

pub use context::{Endpoints, ToolContext, host_of};
pub use error::ToolError;
pub use spec::ToolSpec;
pub use tool::Tool;
