//! Gemini through Vertex AI (OAuth bearer token auth).

use super::gemini::{self, DEFAULT_GEMINI_MODEL, GenerationConfig};
use crate::model::{Backend, ModelError, ModelRequest, ModelResponse};
use crate::{Error, Result};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_VERTEX_LOCATION: &str = "europe-west1";

/// gcloud access tokens live for an hour; refresh well before that.
const TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

/// Where Vertex AI access tokens come from.
#[derive(Debug, Clone)]
pub enum VertexAuth {
    /// A fixed OAuth access token.
    AccessToken(String),
    /// A command whose stdout is an access token, e.g. `gcloud auth print-access-token`.
    Command(Vec<String>),
}

impl Default for VertexAuth {
    fn default() -> Self {
        Self::Command(vec![
            "gcloud".into(),
            "auth".into(),
            "print-access-token".into(),
        ])
    }
}

impl std::fmt::Display for VertexAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessToken(_) => write!(f, "access_token"),
            Self::Command(argv) => write!(f, "command({})", argv.join(" ")),
        }
    }
}

impl VertexAuth {
    async fn fetch(&self) -> std::result::Result<String, ModelError> {
        let argv = match self {
            Self::AccessToken(token) => return Ok(token.clone()),
            Self::Command(argv) => argv,
        };
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ModelError::Auth("empty token command".into()))?;

        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ModelError::Auth(format!("failed to run {program}: {e}")))?;

        if !output.status.success() {
            return Err(ModelError::Auth(format!(
                "{} exited with {}: {}",
                argv.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(ModelError::Auth(format!("{} printed no token", argv.join(" "))));
        }
        Ok(token)
    }
}

/// Builder for creating a Vertex AI backend.
#[derive(Debug, Clone)]
pub struct VertexAiBackendBuilder {
    project_id: String,
    location: String,
    model: String,
    auth: VertexAuth,
    base_url: Option<String>,
    config: GenerationConfig,
}

impl VertexAiBackendBuilder {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: DEFAULT_VERTEX_LOCATION.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            auth: VertexAuth::default(),
            base_url: None,
            config: GenerationConfig::default(),
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn auth(mut self, auth: VertexAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Override `https://{location}-aiplatform.googleapis.com/v1`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into().trim_end_matches('/').to_string());
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

    pub fn build(self) -> Result<VertexAiBackend> {
        if self.project_id.trim().is_empty() {
            return Err(Error::Config("vertex ai requires a project id".into()));
        }
        let base_url = self
            .base_url
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com/v1", self.location));

        Ok(VertexAiBackend {
            client: reqwest::Client::new(),
            project_id: self.project_id,
            location: self.location,
            model: self.model,
            auth: self.auth,
            base_url,
            config: self.config,
            token: Mutex::new(None),
        })
    }
}

/// Gemini backend on Vertex AI.
pub struct VertexAiBackend {
    client: reqwest::Client,
    project_id: String,
    location: String,
    model: String,
    auth: VertexAuth,
    base_url: String,
    config: GenerationConfig,
    token: Mutex<Option<(String, Instant)>>,
}

impl VertexAiBackend {
    pub fn builder(project_id: impl Into<String>) -> VertexAiBackendBuilder {
        VertexAiBackendBuilder::new(project_id)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url, self.project_id, self.location, self.model
        )
    }

    async fn access_token(&self) -> std::result::Result<String, ModelError> {
        let mut cached = self.token.lock().await;
        if let Some((token, _)) = cached
            .as_ref()
            .filter(|(_, fetched)| fetched.elapsed() < TOKEN_TTL)
        {
            return Ok(token.clone());
        }

        tracing::debug!(auth = %self.auth, "fetching vertex ai access token");
        let token = self.auth.fetch().await?;
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}

impl std::fmt::Display for VertexAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vertex({}, project={}, location={})",
            self.model, self.project_id, self.location
        )
    }
}

impl Backend for VertexAiBackend {
    fn name(&self) -> &str {
        "vertex"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, request: ModelRequest<'_>) -> std::result::Result<ModelResponse, ModelError> {
        let token = self.access_token().await?;
        let body = gemini::build_request(request, self.config);
        tracing::debug!(model = %self.model, tools = request.tools.len(), "vertex ai request");

        let req = self.client.post(self.endpoint()).bearer_auth(token);
        gemini::send(req, &body).await
    }
}
