use super::errors::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::ops::AddAssign;
use tools::{ToolError, ToolSpec};

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// The result the host returned from a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success {
        tool_call_id: String,
        name: String,
        output: Value,
    },
    Failure {
        tool_call_id: String,
        name: String,
        error: ToolError,
    },
}

impl ToolResult {
    pub fn tool_call_id(&self) -> &str {
        match self {
            Self::Success { tool_call_id, .. } | Self::Failure { tool_call_id, .. } => tool_call_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Success { name, .. } | Self::Failure { name, .. } => name,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// The result as a JSON value: the output, or `{"error": "..."}`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Success { output, .. } => output.clone(),
            Self::Failure { error, .. } => serde_json::json!({ "error": error.to_string() }),
        }
    }

    /// The result rendered as text for providers that take string content.
    pub fn content(&self) -> String {
        match self {
            Self::Success {
                output: Value::String(s),
                ..
            } => s.clone(),
            Self::Success { output, .. } => output.to_string(),
            Self::Failure { error, .. } => format!("Error: {error}"),
        }
    }
}

/// A part of a message, which can be text or a tool interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// A message, consisting of a role and one or more parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// A user-role message carrying the results of the previous tool calls.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::User,
            parts: results.into_iter().map(Part::ToolResult).collect(),
        }
    }

    /// Get combined text content from all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool calls from this message.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Other(String),
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Everything needed for a model request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
}

/// The response from a model.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: Message,
    pub usage: Usage,
    pub finish_reason: FinishReason,
}

/// Trait for LLM provider backends.
pub trait Backend: Send + Sync {
    /// Provider name as recorded in the event log, e.g. `openai`.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    fn call(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_extraction() {
        let msg = Message {
            role: Role::Assistant,
            parts: vec![
                Part::Text("Hello ".into()),
                Part::ToolCall(ToolCall {
                    id: "1".into(),
                    name: "test".into(),
                    input: Value::Null,
                }),
                Part::Text("world".into()),
            ],
        };
        assert_eq!(msg.text(), "Hello world");
    }

    #[test]
    fn message_tool_calls_extraction() {
        let msg = Message {
            role: Role::Assistant,
            parts: vec![
                Part::Text("Let me help".into()),
                Part::ToolCall(ToolCall {
                    id: "1".into(),
                    name: "get_weather".into(),
                    input: serde_json::json!({"location": "Oslo"}),
                }),
                Part::ToolCall(ToolCall {
                    id: "2".into(),
                    name: "read_file".into(),
                    input: serde_json::json!({"path": "notes.txt"}),
                }),
            ],
        };
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[1].name, "read_file");
    }

    #[test]
    fn tool_result_content() {
        let ok = ToolResult::Success {
            tool_call_id: "1".into(),
            name: "read_file".into(),
            output: Value::String("plain text".into()),
        };
        assert_eq!(ok.content(), "plain text");
        assert!(!ok.is_error());

        let err = ToolResult::Failure {
            tool_call_id: "2".into(),
            name: "delete_file".into(),
            error: ToolError::CapabilityDenied("fs_delete /etc".into()),
        };
        assert_eq!(err.content(), "Error: capability denied: fs_delete /etc");
        assert_eq!(err.to_value()["error"], "capability denied: fs_delete /etc");
        assert_eq!(err.name(), "delete_file");
    }

    #[test]
    fn usage_accumulates() {
        let mut usage = Usage::default();
        usage += Usage {
            input_tokens: 10,
            output_tokens: 3,
        };
        usage += Usage {
            input_tokens: 5,
            output_tokens: 2,
        };
        assert_eq!(usage.input_tokens, 15);
        assert_eq!(usage.total(), 20);
    }
}
