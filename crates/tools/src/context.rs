//! Shared state handed to every tool invocation.

use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

const USER_AGENT: &str = concat!("llm-toolchain/", env!("CARGO_PKG_VERSION"));
const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

/// Base URLs of the public services the network tools talk to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Open-Meteo geocoding API.
    pub geocoding: String,
    /// Open-Meteo forecast API.
    pub forecast: String,
    /// Nominatim reverse geocoding API.
    pub nominatim: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            geocoding: "https://geocoding-api.open-meteo.com".to_string(),
            forecast: "https://api.open-meteo.com".to_string(),
            nominatim: "https://nominatim.openstreetmap.org".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at one base URL (test servers).
    pub fn all(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            geocoding: base.clone(),
            forecast: base.clone(),
            nominatim: base,
        }
    }
}

/// Follow redirects only while they stay on the host the policy approved.
fn same_host_redirects() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        let origin = attempt.previous().first().and_then(|u| u.host_str().map(str::to_string));
        let target = attempt.url().host_str().map(str::to_string);
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error(format!("more than {MAX_REDIRECTS} redirects"))
        } else if origin != target {
            let target = target.unwrap_or_default();
            attempt.error(format!("redirect to another host '{target}' refused"))
        } else {
            attempt.follow()
        }
    })
}

/// Execution context for tools.
///
/// Holds the working directory that relative paths resolve against. The
/// directory is shared and mutable so `change_directory` affects later calls.
#[derive(Debug)]
pub struct ToolContext {
    cwd: RwLock<PathBuf>,
    http: reqwest::Client,
    endpoints: Endpoints,
    python: String,
    exec_timeout: Duration,
}

impl ToolContext {
    /// Create a context rooted at `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .redirect(same_host_redirects())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("falling back to default HTTP client: {e}");
                reqwest::Client::new()
            });

        Self {
            cwd: RwLock::new(cwd.into()),
            http,
            endpoints: Endpoints::default(),
            python: "python3".to_string(),
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }

    /// Create a context rooted at the process working directory.
    pub fn from_current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Interpreter used by `run_python_code`.
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Time limit for subprocesses started by tools.
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    pub fn cwd(&self) -> PathBuf {
        self.cwd
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_cwd(&self, dir: PathBuf) {
        *self
            .cwd
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = dir;
    }

    /// Resolve `path` against the working directory, folding `.` and `..`.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd().join(path)
        };

        let mut out = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    out.pop();
                }
                other => out.push(other.as_os_str()),
            }
        }
        out
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn python(&self) -> &str {
        &self.python
    }

    pub fn exec_timeout(&self) -> Duration {
        self.exec_timeout
    }
}

/// Host component of a URL, if it parses.
pub fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_folds_relative_components() {
        let ctx = ToolContext::new("/work/project");
        assert_eq!(ctx.resolve("src/../notes.txt"), PathBuf::from("/work/project/notes.txt"));
        assert_eq!(ctx.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(ctx.resolve("."), PathBuf::from("/work/project"));
    }

    #[test]
    fn set_cwd_changes_resolution() {
        let ctx = ToolContext::new("/a");
        ctx.set_cwd(PathBuf::from("/b"));
        assert_eq!(ctx.resolve("x"), PathBuf::from("/b/x"));
    }

    #[test]
    fn host_of_extracts_host() {
        assert_eq!(host_of("https://api.open-meteo.com/v1").as_deref(), Some("api.open-meteo.com"));
        assert_eq!(host_of("not a url"), None);
    }
}
