//! The tool trait.

use crate::{ToolContext, ToolError, ToolSpec};
use async_trait::async_trait;
use policy::CapabilityRequest;
use serde_json::Value;

/// A callable tool the model can invoke.
///
/// Implementations declare the capabilities a call needs so the host can
/// check them against policy before [`Tool::execute`] runs.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            schema: self.parameters_schema(),
        }
    }

    /// Capabilities a call with `args` requires. Pure tools need none.
    fn capabilities(&self, _args: &Value, _ctx: &ToolContext) -> Vec<CapabilityRequest> {
        Vec::new()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}
