//! Text embedders used to match prompts against tool descriptions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::ModelError;

pub const LEXICAL_DIMENSIONS: usize = 512;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const BIGRAM_WEIGHT: f32 = 0.5;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "any", "are", "as", "at", "be", "by", "can", "could", "do", "does", "for",
    "from", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or",
    "please", "should", "so", "that", "the", "their", "them", "then", "there", "this", "to",
    "us", "was", "we", "what", "whats", "when", "where", "which", "will", "with", "would", "you",
    "your",
];

/// Words that mean roughly the same as a word the tool descriptions use.
const SYNONYMS: &[(&str, &str)] = &[
    ("forecast", "weather"),
    ("rain", "weather"),
    ("sunny", "weather"),
    ("folder", "directory"),
    ("dir", "directory"),
    ("cd", "directory"),
    ("website", "web"),
    ("webpage", "web"),
    ("url", "web"),
    ("site", "web"),
    ("meeting", "calendar"),
    ("appointment", "calendar"),
    ("schedule", "calendar"),
    ("remind", "calendar"),
    ("script", "code"),
    ("program", "code"),
    ("execute", "run"),
    ("remove", "delete"),
    ("erase", "delete"),
    ("save", "write"),
    ("regex", "regular"),
    ("lat", "latitude"),
    ("lon", "longitude"),
    ("address", "location"),
    ("invest", "interest"),
    ("savings", "interest"),
    ("chart", "graph"),
    ("diagram", "graph"),
    ("network", "graph"),
];

/// Turns texts into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;
}

/// Offline embedder: hashed bag of words and word bigrams.
///
/// Tokens are lower-cased, stop words dropped and common suffixes stripped,
/// so "files" and "file" or "converting" and "convert" land in the same bucket.
#[derive(Debug, Clone)]
pub struct LexicalEmbedder {
    dimensions: usize,
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self {
            dimensions: LEXICAL_DIMENSIONS,
        }
    }
}

impl LexicalEmbedder {
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dimensions];

        for token in &tokens {
            vector[self.bucket(token)] += 1.0;
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            vector[self.bucket(&bigram)] += BIGRAM_WEIGHT;
        }

        normalize(&mut vector);
        vector
    }

    fn bucket(&self, feature: &str) -> usize {
        (fnv1a(feature) % self.dimensions as u64) as usize
    }
}

#[async_trait]
impl Embedder for LexicalEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if STOPWORDS.contains(&word) {
            continue;
        }
        let word = stem(word);
        if word.len() < 2 {
            continue;
        }
        if let Some((_, canonical)) = SYNONYMS.iter().find(|(alias, _)| *alias == word) {
            tokens.push((*canonical).to_string());
        }
        tokens.push(word);
    }
    tokens
}

fn stem(word: &str) -> String {
    let len = word.len();
    if len > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..len - 3]);
    }
    if len > 5 && word.ends_with("ing") {
        return word[..len - 3].to_string();
    }
    if len > 4 && word.ends_with("ed") {
        return word[..len - 2].to_string();
    }
    if len > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..len - 1].to_string();
    }
    word.to_string()
}

fn fnv1a(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    s.bytes()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

pub(crate) fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Cosine similarity. Zero vectors score 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI embeddings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embeddings from the OpenAI `/v1/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: crate::providers::OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::from_response(response).await);
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(ModelError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}
