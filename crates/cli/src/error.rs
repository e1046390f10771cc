//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The database file does not exist.
    ///
    /// This typically means no session has been recorded yet.
    #[error("database not found at {path}. Run 'llm-toolchain chat' first")]
    DatabaseNotFound { path: PathBuf },

    /// A required credential is not set.
    #[error("{var} not found. Please create a .env file and add it there, or export it")]
    MissingEnv { var: &'static str },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred in the toolchain layer.
    #[error(transparent)]
    Toolchain(#[from] toolchain::Error),

    /// A selector or embedding call failed.
    #[error(transparent)]
    Model(#[from] toolchain::ModelError),

    /// A configured tool name is unknown.
    #[error(transparent)]
    Tool(#[from] tools::ToolError),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
