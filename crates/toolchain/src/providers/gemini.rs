//! Gemini `generateContent` wire format, shared by the GenAI and Vertex backends.

use crate::model::{
    FinishReason, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tools::ToolSpec;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-001";

/// Schema keywords the Gemini function declaration schema rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["additionalProperties", "$schema", "default"];

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    /// Only some models assign ids; they are never echoed back.
    #[serde(default, skip_serializing)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationConfig {
    fn is_empty(&self) -> bool {
        self.max_output_tokens.is_none() && self.temperature.is_none()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn build_request(request: ModelRequest<'_>, config: GenerationConfig) -> GenerateRequest {
    let mut system: Vec<String> = request.system.map(str::to_string).into_iter().collect();
    let mut contents = Vec::with_capacity(request.messages.len());

    for msg in request.messages {
        match msg.role {
            Role::System => system.push(msg.text()),
            Role::User | Role::Assistant => contents.push(message_to_content(msg)),
        }
    }

    let declarations: Vec<FunctionDeclaration> = request.tools.iter().map(tool_to_api).collect();

    GenerateRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| Content {
            role: None,
            parts: vec![ApiPart {
                text: Some(system.join("\n\n")),
                ..Default::default()
            }],
        }),
        tools: if declarations.is_empty() {
            Vec::new()
        } else {
            vec![ApiTool {
                function_declarations: declarations,
            }]
        },
        generation_config: (!config.is_empty()).then_some(config),
    }
}

fn message_to_content(msg: &Message) -> Content {
    let role = match msg.role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    };

    let parts = msg
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => ApiPart {
                text: Some(text.clone()),
                ..Default::default()
            },
            Part::ToolCall(call) => ApiPart {
                function_call: Some(FunctionCall {
                    id: None,
                    name: call.name.clone(),
                    args: call.input.clone(),
                }),
                ..Default::default()
            },
            Part::ToolResult(result) => {
                let response = if result.is_error() {
                    result.to_value()
                } else {
                    json!({ "result": result.to_value() })
                };
                ApiPart {
                    function_response: Some(FunctionResponse {
                        name: result.name().to_string(),
                        response,
                    }),
                    ..Default::default()
                }
            }
        })
        .collect();

    Content {
        role: Some(role.to_string()),
        parts,
    }
}

fn tool_to_api(spec: &ToolSpec) -> FunctionDeclaration {
    let mut parameters = spec.schema.clone();
    sanitize_schema(&mut parameters);
    FunctionDeclaration {
        name: spec.name.clone(),
        description: spec.description.clone(),
        parameters,
    }
}

/// Strip schema keywords Gemini rejects, recursively.
fn sanitize_schema(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in UNSUPPORTED_SCHEMA_KEYS {
                map.remove(*key);
            }
            map.values_mut().for_each(sanitize_schema);
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_schema),
        _ => {}
    }
}

pub(crate) fn parse_response(response: GenerateResponse) -> Result<ModelResponse, ModelError> {
    let usage = response
        .usage_metadata
        .map(|u| Usage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(ModelError::InvalidResponse(format!(
            "response has no candidates: {reason}"
        )));
    };

    let mut parts = Vec::new();
    let mut call_index = 0;
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = part.text.filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text));
        }
        if let Some(call) = part.function_call {
            let id = call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("{}-{call_index}", call.name));
            call_index += 1;
            let input = match call.args {
                Value::Null => json!({}),
                args => args,
            };
            parts.push(Part::ToolCall(ToolCall {
                id,
                name: call.name,
                input,
            }));
        }
    }

    let finish_reason = if parts.iter().any(|p| matches!(p, Part::ToolCall(_))) {
        FinishReason::ToolCalls
    } else {
        match candidate.finish_reason.as_deref() {
            Some("STOP") | None => FinishReason::Stop,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => {
                FinishReason::ContentFilter
            }
            Some(other) => FinishReason::Other(other.to_string()),
        }
    };

    Ok(ModelResponse {
        message: Message {
            role: Role::Assistant,
            parts,
        },
        usage,
        finish_reason,
    })
}

/// Send a prepared `generateContent` request and decode the reply.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    body: &GenerateRequest,
) -> Result<ModelResponse, ModelError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| ModelError::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ModelError::from_response(response).await);
    }

    let api_response: GenerateResponse = response
        .json()
        .await
        .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

    parse_response(api_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolResult;
    use tools::ToolError;

    #[test]
    fn schema_is_sanitized() {
        let spec = ToolSpec {
            name: "write_file".into(),
            description: "Write".into(),
            schema: json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "path": {"type": "string", "default": "out.txt"},
                    "tags": {"type": "array", "items": {"type": "object", "additionalProperties": true}}
                }
            }),
        };
        let decl = tool_to_api(&spec);
        let text = decl.parameters.to_string();
        assert!(!text.contains("additionalProperties"));
        assert!(!text.contains("$schema"));
        assert!(!text.contains("default"));
        assert_eq!(decl.parameters["properties"]["path"]["type"], "string");
    }

    #[test]
    fn builds_contents_with_function_parts() {
        let messages = vec![
            Message::system("Extra rules."),
            Message::user("Weather in Oslo?"),
            Message {
                role: Role::Assistant,
                parts: vec![Part::ToolCall(ToolCall {
                    id: "get_weather-0".into(),
                    name: "get_weather".into(),
                    input: json!({"location": "Oslo"}),
                })],
            },
            Message::tool_results(vec![
                ToolResult::Success {
                    tool_call_id: "get_weather-0".into(),
                    name: "get_weather".into(),
                    output: json!({"temperature": 4.5}),
                },
                ToolResult::Failure {
                    tool_call_id: "x".into(),
                    name: "delete_file".into(),
                    error: ToolError::NotFound("delete_file".into()),
                },
            ]),
        ];
        let request = build_request(
            ModelRequest {
                system: Some("Be brief."),
                messages: &messages,
                tools: &[],
            },
            GenerationConfig::default(),
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "Be brief.\n\nExtra rules."
        );
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(
            json["contents"][1]["parts"][0]["functionCall"],
            json!({"name": "get_weather", "args": {"location": "Oslo"}})
        );
        let responses = &json["contents"][2]["parts"];
        assert_eq!(
            responses[0]["functionResponse"]["response"],
            json!({"result": {"temperature": 4.5}})
        );
        assert_eq!(
            responses[1]["functionResponse"]["response"]["error"],
            "tool not found: delete_file"
        );
        assert!(json.get("tools").is_none());
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn parses_calls_and_assigns_ids() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Checking."},
                    {"functionCall": {"name": "get_weather", "args": {"location": "Paris"}}},
                    {"functionCall": {"id": "abc", "name": "convert_units", "args": {}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 20, "candidatesTokenCount": 5}
        }))
        .unwrap();

        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.finish_reason, FinishReason::ToolCalls);
        assert_eq!(parsed.message.text(), "Checking.");
        let calls = parsed.message.tool_calls();
        assert_eq!(calls[0].id, "get_weather-0");
        assert_eq!(calls[1].id, "abc");
        assert_eq!(parsed.usage.output_tokens, 5);
    }

    #[test]
    fn blocked_prompt_is_invalid_response() {
        let response: GenerateResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        let err = parse_response(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
