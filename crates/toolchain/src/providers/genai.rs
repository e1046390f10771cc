//! Gemini through the Generative Language API (API key auth).

use super::gemini::{self, DEFAULT_GEMINI_MODEL, GenerationConfig};
use crate::model::{Backend, ModelError, ModelRequest, ModelResponse};

pub const GENAI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Builder for creating a GenAI backend.
#[derive(Debug, Clone)]
pub struct GenAiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
    config: GenerationConfig,
}

impl GenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: GENAI_API_URL.to_string(),
            config: GenerationConfig::default(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_output_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn build(self) -> GenAiBackend {
        GenAiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            base_url: self.base_url,
            config: self.config,
        }
    }
}

/// Gemini backend authenticated with a Generative Language API key.
pub struct GenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    config: GenerationConfig,
}

impl GenAiBackend {
    pub fn builder(api_key: impl Into<String>) -> GenAiBackendBuilder {
        GenAiBackendBuilder::new(api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl std::fmt::Display for GenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gemini({})", self.model)
    }
}

impl Backend for GenAiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let body = gemini::build_request(request, self.config);
        tracing::debug!(model = %self.model, tools = request.tools.len(), "genai request");

        let req = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key);
        gemini::send(req, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;
    use serde_json::json;
    use tools::ToolSpec;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_generate_content_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash-001:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "Convert 10 km to miles"}]}],
                "tools": [{"functionDeclarations": [{"name": "convert_units"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "10 km is 6.21 miles."}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 8}
            })))
            .mount(&server)
            .await;

        let backend = GenAiBackend::builder("g-key").base_url(server.uri()).build();
        let messages = [Message::user("Convert 10 km to miles")];
        let tools = [ToolSpec {
            name: "convert_units".into(),
            description: "Convert units".into(),
            schema: json!({"type": "object", "properties": {}}),
        }];
        let response = backend
            .call(ModelRequest {
                system: None,
                messages: &messages,
                tools: &tools,
            })
            .await
            .unwrap();

        assert_eq!(response.message.text(), "10 km is 6.21 miles.");
        assert_eq!(response.usage.input_tokens, 12);
    }

    #[tokio::test]
    async fn error_status_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let backend = GenAiBackend::builder("bad").base_url(server.uri()).build();
        let messages = [Message::user("hi")];
        let err = backend
            .call(ModelRequest {
                system: None,
                messages: &messages,
                tools: &[],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Api { status: 400, .. }));
    }
}
