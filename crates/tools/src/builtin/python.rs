use std::process::Stdio;

use async_trait::async_trait;
use policy::CapabilityRequest;
use serde_json::{Value, json};
use tokio::process::Command;

use crate::args::required_str;
use crate::{Tool, ToolContext, ToolError};

/// Run a Python snippet in a subprocess.
pub struct RunPythonCode;

#[async_trait]
impl Tool for RunPythonCode {
    fn name(&self) -> &str {
        "run_python_code"
    }

    fn description(&self) -> &str {
        "Execute Python code and return its printed output (stdout), errors (stderr) and exit code. Use print() to show results."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "Python source code to run"}
            },
            "required": ["code"]
        })
    }

    fn capabilities(&self, _args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        vec![CapabilityRequest::exec(ctx.python())]
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let code = required_str(&args, "code")?;
        let timeout = ctx.exec_timeout();

        let child = Command::new(ctx.python())
            .arg("-c")
            .arg(code)
            .current_dir(ctx.cwd())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Execution(format!("failed to start {}: {e}", ctx.python())))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout(timeout.as_millis() as u64))??;

        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exit_code": output.status.code(),
        }))
    }
}
