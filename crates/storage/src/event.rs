//! Event types for the session log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// The kind of event that occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Session started against a provider.
    SessionStart { provider: String, model: String },
    /// A user prompt was submitted.
    Prompt { text: String },
    /// The selector picked these tools for the prompt.
    ToolsSelected { names: Vec<String> },
    /// A tool was invoked.
    ToolCall {
        name: String,
        input: serde_json::Value,
    },
    /// A tool returned a result.
    ToolResult {
        name: String,
        output: serde_json::Value,
        is_error: bool,
    },
    /// The final model response for a prompt.
    Response {
        text: String,
        input_tokens: u32,
        output_tokens: u32,
    },
    /// A run ended with an error.
    RunFailed { message: String },
    /// Session ended.
    SessionEnd,
}

impl EventKind {
    /// Stable name stored alongside the payload, used for filtering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::Prompt { .. } => "prompt",
            Self::ToolsSelected { .. } => "tools_selected",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Response { .. } => "response",
            Self::RunFailed { .. } => "run_failed",
            Self::SessionEnd => "session_end",
        }
    }
}

/// An event in the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(session_id: SessionId, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn prompt(session_id: SessionId, text: impl Into<String>) -> Self {
        Self::new(session_id, EventKind::Prompt { text: text.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_with_tag() {
        let kind = EventKind::ToolCall {
            name: "get_weather".into(),
            input: serde_json::json!({"location": "Oslo"}),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "tool_call");
        assert_eq!(kind.name(), "tool_call");
    }

    #[test]
    fn session_id_parses_display() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
