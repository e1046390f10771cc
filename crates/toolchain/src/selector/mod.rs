//! Semantic tool selection.
//!
//! Offering every tool on every request wastes tokens and confuses smaller
//! models. [`SemanticToolSelector`] embeds each tool's description once,
//! embeds the prompt, and offers only the closest matches.

mod embed;

pub use embed::{
    DEFAULT_EMBEDDING_MODEL, Embedder, LEXICAL_DIMENSIONS, LexicalEmbedder, OpenAiEmbedder, cosine,
};

use std::sync::Arc;

use tokio::sync::OnceCell;
use tools::Tool;

use crate::model::ModelError;

pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_MIN_SCORE: f32 = 0.1;

/// A tool and how well it matches a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTool {
    pub name: String,
    pub score: f32,
}

/// Picks the tools most relevant to a prompt.
pub struct SemanticToolSelector {
    tools: Vec<Arc<dyn Tool>>,
    embedder: Box<dyn Embedder>,
    top_k: usize,
    min_score: f32,
    always_include: Vec<String>,
    index: OnceCell<Vec<Vec<f32>>>,
}

impl SemanticToolSelector {
    /// Select among `tools` using the offline [`LexicalEmbedder`].
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools,
            embedder: Box::new(LexicalEmbedder::default()),
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            always_include: Vec::new(),
            index: OnceCell::new(),
        }
    }

    pub fn with_embedder(mut self, embedder: impl Embedder + 'static) -> Self {
        self.embedder = Box::new(embedder);
        self.index = OnceCell::new();
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Tools offered for every prompt regardless of score.
    pub fn always_include<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.always_include = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    async fn tool_embeddings(&self) -> Result<&Vec<Vec<f32>>, ModelError> {
        self.index
            .get_or_try_init(|| async {
                let documents: Vec<String> =
                    self.tools.iter().map(|t| t.spec().document()).collect();
                tracing::debug!(tools = documents.len(), "embedding tool descriptions");
                let vectors = self.embedder.embed(&documents).await?;
                if vectors.len() != documents.len() {
                    return Err(ModelError::InvalidResponse(format!(
                        "embedder returned {} vectors for {} tools",
                        vectors.len(),
                        documents.len()
                    )));
                }
                Ok(vectors)
            })
            .await
    }

    /// Score every tool against `prompt`, best first. Ties keep registration order.
    pub async fn rank(&self, prompt: &str) -> Result<Vec<ScoredTool>, ModelError> {
        let index = self.tool_embeddings().await?;
        let query = self
            .embedder
            .embed(&[prompt.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("embedder returned no vector".into()))?;

        let mut scored: Vec<ScoredTool> = self
            .tools
            .iter()
            .zip(index)
            .map(|(tool, vector)| ScoredTool {
                name: tool.name().to_string(),
                score: cosine(&query, vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }

    /// The tools to offer for `prompt`.
    ///
    /// Tools scoring at least `min_score`, best first, capped at `top_k`,
    /// followed by any always-included tools not already chosen.
    pub async fn select(&self, prompt: &str) -> Result<Vec<Arc<dyn Tool>>, ModelError> {
        let mut names: Vec<String> = if prompt.trim().is_empty() {
            Vec::new()
        } else {
            self.rank(prompt)
                .await?
                .into_iter()
                .filter(|s| s.score >= self.min_score)
                .take(self.top_k)
                .map(|s| s.name)
                .collect()
        };

        for name in &self.always_include {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        let selected: Vec<Arc<dyn Tool>> = names
            .iter()
            .filter_map(|name| self.tools.iter().find(|t| t.name() == name).cloned())
            .collect();

        tracing::info!(
            selected = ?selected.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "selected tools"
        );
        Ok(selected)
    }
}
