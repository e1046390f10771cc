//! Configuration loading from llm-toolchain.toml.

use std::path::{Path, PathBuf};

use policy::{AllowRules, DenyRules, Policy};
use serde::Deserialize;
use toolchain::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOOL_TIMEOUT};

pub const CONFIG_FILE: &str = "llm-toolchain.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub toolchain: ToolchainConfig,

    #[serde(default)]
    pub selector: SelectorConfig,

    /// Directory that relative policy paths resolve against.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Policy rules. A missing `[allow]` or `[deny]` table is taken from the
    /// standard policy, so `[deny]` alone only narrows the defaults.
    #[serde(default)]
    pub allow: Option<AllowRules>,

    #[serde(default)]
    pub deny: Option<DenyRules>,
}

/// Which provider answers prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[value(name = "openai")]
    OpenAi,
    /// Gemini via the Generative Language API.
    Gemini,
    /// Gemini on Vertex AI.
    Vertex,
}

/// Backend provider configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Model to use. Defaults per provider.
    pub model: Option<String>,

    /// Override the provider's API base URL.
    pub base_url: Option<String>,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,

    /// Vertex AI region.
    pub location: Option<String>,

    /// Vertex AI project. `GEMINI_PROJECT_ID` takes precedence.
    pub project_id: Option<String>,
}

/// Run loop settings.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    pub system_prompt: Option<String>,

    #[serde(default)]
    pub keep_history: bool,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            system_prompt: None,
            keep_history: false,
        }
    }
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT.as_secs()
}

/// Which embedder scores tools against prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Lexical,
    OpenAi,
}

/// Semantic tool selection settings.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorConfig {
    /// When off, every built-in tool is offered with every prompt.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_min_score")]
    pub min_score: f32,

    #[serde(default)]
    pub embedder: EmbedderKind,

    pub embedding_model: Option<String>,

    #[serde(default)]
    pub always_include: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            min_score: default_min_score(),
            embedder: EmbedderKind::default(),
            embedding_model: None,
            always_include: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> usize {
    toolchain::selector::DEFAULT_TOP_K
}

fn default_min_score() -> f32 {
    toolchain::selector::DEFAULT_MIN_SCORE
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `path`, or `llm-toolchain.toml` when it exists, or the defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// The capability policy, rooted at the configured root or `cwd`.
    pub fn policy(&self, cwd: &Path) -> Policy {
        let root = match &self.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => cwd.join(root),
            None => cwd.to_path_buf(),
        };

        let standard = Policy::standard();
        Policy {
            root: None,
            allow: self.allow.clone().unwrap_or(standard.allow),
            deny: self.deny.clone().unwrap_or(standard.deny),
        }
        .with_root(root)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::{CapabilityKind, CapabilityRequest};

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.backend.provider, Provider::OpenAi);
        assert_eq!(config.toolchain.max_iterations, 8);
        assert_eq!(config.toolchain.tool_timeout_secs, 60);
        assert!(config.selector.enabled);
        assert_eq!(config.selector.top_k, 4);
        assert_eq!(config.selector.embedder, EmbedderKind::Lexical);
    }

    #[test]
    fn parses_all_sections() {
        let config = Config::parse(
            r#"
            [backend]
            provider = "vertex"
            model = "gemini-1.5-pro"
            location = "us-central1"
            project_id = "demo"

            [toolchain]
            max_iterations = 3
            system_prompt = "Answer in French."
            keep_history = true

            [selector]
            top_k = 2
            min_score = 0.2
            embedder = "openai"
            always_include = ["read_file"]

            [allow]
            fs_read = ["."]
            net_http = ["api.open-meteo.com"]

            [deny]
            all = ["exec"]
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.provider, Provider::Vertex);
        assert_eq!(config.backend.location.as_deref(), Some("us-central1"));
        assert_eq!(config.toolchain.max_iterations, 3);
        assert!(config.toolchain.keep_history);
        assert_eq!(config.selector.embedder, EmbedderKind::OpenAi);
        assert_eq!(config.selector.always_include, vec!["read_file"]);

        let policy = config.policy(Path::new("/work"));
        assert!(policy.check(&CapabilityRequest::fs_read("/work/a.txt")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::fs_write("/work/a.txt")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::new(CapabilityKind::Exec)).is_allowed());
    }

    #[test]
    fn missing_policy_tables_fall_back_to_standard() {
        let config = Config::parse("[backend]\nprovider = \"gemini\"\n").unwrap();
        let policy = config.policy(Path::new("/work"));
        assert!(policy.check(&CapabilityRequest::exec("python3")).is_allowed());
        assert!(policy.check(&CapabilityRequest::net_http("example.com")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::fs_delete("/etc/passwd")).is_allowed());
    }

    #[test]
    fn deny_table_alone_keeps_standard_allows() {
        let config = Config::parse("[deny]\nall = [\"exec\"]\n").unwrap();
        let policy = config.policy(Path::new("/work"));
        assert!(policy.check(&CapabilityRequest::fs_read("/work/a.txt")).is_allowed());
        assert!(policy.check(&CapabilityRequest::net_http("api.open-meteo.com")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::exec("python3")).is_allowed());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::parse("[backend]\nprovidr = \"openai\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
