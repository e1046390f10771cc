//! Tool host: registered tools, policy enforcement and timeouts.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use policy::{Decision, Policy};
use tools::{Tool, ToolContext, ToolError, ToolSpec};

use crate::model::{ToolCall, ToolResult};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Owns the callable tools and runs model tool calls against them.
///
/// Every call is checked against the [`Policy`] before the tool runs, and
/// every failure comes back as a [`ToolResult::Failure`] for the model to
/// see rather than as an error.
pub struct ToolHost {
    tools: Vec<Arc<dyn Tool>>,
    ctx: ToolContext,
    policy: Policy,
    timeout: Duration,
}

impl ToolHost {
    pub fn new(ctx: ToolContext, policy: Policy) -> Self {
        Self {
            tools: Vec::new(),
            ctx,
            policy,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => {
                tracing::debug!(tool = tool.name(), "replacing registered tool");
                *slot = tool;
            }
            None => self.tools.push(tool),
        }
    }

    pub fn register_all(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Registered tools in registration order.
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run one tool call, returning its success or failure.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        match self.try_execute(call).await {
            Ok(output) => ToolResult::Success {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                output,
            },
            Err(error) => {
                tracing::warn!(tool = %call.name, %error, "tool call failed");
                ToolResult::Failure {
                    tool_call_id: call.id.clone(),
                    name: call.name.clone(),
                    error,
                }
            }
        }
    }

    async fn try_execute(&self, call: &ToolCall) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        for capability in tool.capabilities(&call.input, &self.ctx) {
            if let Decision::Deny { reason } = self.policy.check(&capability) {
                return Err(ToolError::CapabilityDenied(reason));
            }
        }

        tracing::info!(tool = %call.name, input = %call.input, "executing tool");
        let run = AssertUnwindSafe(tool.execute(call.input.clone(), &self.ctx)).catch_unwind();
        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => Err(ToolError::Timeout(self.timeout.as_millis() as u64)),
            Ok(Err(_)) => {
                tracing::error!(tool = %call.name, "tool panicked");
                Err(ToolError::Execution("tool panicked".into()))
            }
            Ok(Ok(result)) => result,
        }
    }
}
