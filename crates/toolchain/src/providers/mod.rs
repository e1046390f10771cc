//! LLM provider adapters.
//!
//! Each provider implements [`Backend`] for its specific API. [`AnyBackend`]
//! picks one at runtime.

mod gemini;
mod genai;
mod openai;
mod vertexai;

pub use gemini::DEFAULT_GEMINI_MODEL;
pub use genai::{GENAI_API_URL, GenAiBackend, GenAiBackendBuilder};
pub use openai::{DEFAULT_OPENAI_MODEL, OPENAI_API_URL, OpenAiBackend, OpenAiBackendBuilder};
pub use vertexai::{DEFAULT_VERTEX_LOCATION, VertexAiBackend, VertexAiBackendBuilder, VertexAuth};

use crate::model::{Backend, ModelError, ModelRequest, ModelResponse};

/// A backend chosen at runtime.
pub enum AnyBackend {
    OpenAi(OpenAiBackend),
    GenAi(GenAiBackend),
    VertexAi(VertexAiBackend),
}

impl From<OpenAiBackend> for AnyBackend {
    fn from(backend: OpenAiBackend) -> Self {
        Self::OpenAi(backend)
    }
}

impl From<GenAiBackend> for AnyBackend {
    fn from(backend: GenAiBackend) -> Self {
        Self::GenAi(backend)
    }
}

impl From<VertexAiBackend> for AnyBackend {
    fn from(backend: VertexAiBackend) -> Self {
        Self::VertexAi(backend)
    }
}

impl std::fmt::Display for AnyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi(b) => std::fmt::Display::fmt(b, f),
            Self::GenAi(b) => std::fmt::Display::fmt(b, f),
            Self::VertexAi(b) => std::fmt::Display::fmt(b, f),
        }
    }
}

impl Backend for AnyBackend {
    fn name(&self) -> &str {
        match self {
            Self::OpenAi(b) => b.name(),
            Self::GenAi(b) => b.name(),
            Self::VertexAi(b) => b.name(),
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::OpenAi(b) => b.model(),
            Self::GenAi(b) => b.model(),
            Self::VertexAi(b) => b.model(),
        }
    }

    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        match self {
            Self::OpenAi(b) => b.call(request).await,
            Self::GenAi(b) => b.call(request).await,
            Self::VertexAi(b) => b.call(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_backend_delegates() {
        let backend: AnyBackend = GenAiBackend::builder("k").model("gemini-1.5-pro").build().into();
        assert_eq!(backend.name(), "gemini");
        assert_eq!(backend.model(), "gemini-1.5-pro");
        assert_eq!(backend.to_string(), "gemini(gemini-1.5-pro)");

        let backend: AnyBackend = OpenAiBackend::builder("k").build().into();
        assert_eq!(backend.name(), "openai");
        assert_eq!(backend.model(), DEFAULT_OPENAI_MODEL);
    }
}
