//! Policy configuration and enforcement.

use crate::{CapabilityKind, CapabilityRequest, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Policy configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Directory that relative allowlist entries resolve against.
    ///
    /// Falls back to the process working directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Capabilities that are explicitly allowed.
    #[serde(default)]
    pub allow: AllowRules,

    /// Capabilities that are explicitly denied (overrides allow).
    #[serde(default)]
    pub deny: DenyRules,
}

/// Rules for allowed capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowRules {
    /// Allowed file read paths (glob patterns).
    #[serde(default)]
    pub fs_read: Vec<String>,

    /// Allowed file write paths (glob patterns).
    #[serde(default)]
    pub fs_write: Vec<String>,

    /// Allowed file delete paths (glob patterns).
    #[serde(default)]
    pub fs_delete: Vec<String>,

    /// Allowed HTTP hosts.
    #[serde(default)]
    pub net_http: Vec<String>,

    /// Allowed commands (exact or prefix match).
    #[serde(default)]
    pub exec: Vec<String>,
}

/// Rules for denied capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenyRules {
    /// Deny all capabilities of these kinds.
    #[serde(default)]
    pub all: HashSet<CapabilityKind>,
}

/// Result of a capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert a denial into an error.
    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny { reason } => Err(Error::Denied(reason)),
        }
    }
}

impl Policy {
    /// Load policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Filesystem access inside the root only. No deletes, network or exec.
    pub fn restrictive() -> Self {
        let deny_all = HashSet::from([
            CapabilityKind::FsDelete,
            CapabilityKind::Exec,
            CapabilityKind::NetHttp,
        ]);

        Self {
            root: None,
            allow: AllowRules {
                fs_read: vec![".".to_string()],
                fs_write: vec![".".to_string()],
                ..Default::default()
            },
            deny: DenyRules { all: deny_all },
        }
    }

    /// The default for the built-in tools.
    ///
    /// Filesystem access inside the root, any HTTP host, and the interpreters
    /// the code and graph tools shell out to.
    pub fn standard() -> Self {
        Self {
            root: None,
            allow: AllowRules {
                fs_read: vec![".".to_string()],
                fs_write: vec![".".to_string()],
                fs_delete: vec![".".to_string()],
                net_http: vec!["*".to_string()],
                exec: vec!["python3".to_string(), "python".to_string(), "dot".to_string()],
            },
            deny: DenyRules::default(),
        }
    }

    /// Allow everything.
    pub fn permissive() -> Self {
        let all = vec!["*".to_string()];
        Self {
            root: None,
            allow: AllowRules {
                fs_read: all.clone(),
                fs_write: all.clone(),
                fs_delete: all.clone(),
                net_http: all.clone(),
                exec: all,
            },
            deny: DenyRules::default(),
        }
    }

    /// Resolve relative allowlist paths against `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Check if a capability request is allowed.
    pub fn check(&self, request: &CapabilityRequest) -> Decision {
        if self.deny.all.contains(&request.kind) {
            tracing::debug!(capability = %request, "denied by deny-all rule");
            return Decision::Deny {
                reason: format!("{} is denied by policy", request.kind),
            };
        }

        let scope = request.scope.as_deref();
        let allowed = match request.kind {
            CapabilityKind::FsRead => self.check_path_allowed(&self.allow.fs_read, scope),
            CapabilityKind::FsWrite => self.check_path_allowed(&self.allow.fs_write, scope),
            CapabilityKind::FsDelete => self.check_path_allowed(&self.allow.fs_delete, scope),
            CapabilityKind::NetHttp => check_host_allowed(&self.allow.net_http, scope),
            CapabilityKind::Exec => check_command_allowed(&self.allow.exec, scope),
        };

        if allowed {
            Decision::Allow
        } else {
            tracing::debug!(capability = %request, "not in allowlist");
            Decision::Deny {
                reason: format!(
                    "{} not in allowlist{}",
                    request.kind,
                    scope.map(|s| format!(" (scope: {s})")).unwrap_or_default()
                ),
            }
        }
    }

    fn root(&self) -> PathBuf {
        self.root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn check_path_allowed(&self, allowlist: &[String], scope: Option<&str>) -> bool {
        let Some(path) = scope else {
            return !allowlist.is_empty(); // No scope = any path, allow if list non-empty
        };

        let root = self.root();
        let path = normalize(&root, Path::new(path));

        allowlist.iter().any(|pattern| {
            if pattern == "*" || pattern == "**" {
                return true;
            }
            // Recursive glob: foo/** matches foo/bar/baz
            if let Some(prefix) = pattern.strip_suffix("/**") {
                return path.starts_with(normalize(&root, Path::new(prefix)));
            }
            // Simple glob: foo/* matches foo/bar but not foo/bar/baz
            if let Some(prefix) = pattern.strip_suffix("/*") {
                let dir = normalize(&root, Path::new(prefix));
                return path.parent() == Some(dir.as_path());
            }
            path.starts_with(normalize(&root, Path::new(pattern)))
        })
    }
}

fn check_host_allowed(allowlist: &[String], scope: Option<&str>) -> bool {
    let Some(host) = scope else {
        return !allowlist.is_empty();
    };
    let host = host.to_ascii_lowercase();

    allowlist.iter().any(|allowed| {
        let allowed = allowed.to_ascii_lowercase();
        allowed == "*" || host == allowed || host.ends_with(&format!(".{allowed}"))
    })
}

fn check_command_allowed(allowlist: &[String], scope: Option<&str>) -> bool {
    let Some(cmd) = scope else {
        return !allowlist.is_empty();
    };

    // Exact match or prefix match (e.g., "git" allows "git status")
    allowlist
        .iter()
        .any(|allowed| allowed == "*" || cmd == allowed || cmd.starts_with(&format!("{allowed} ")))
}

/// Resolve `path` against `root` and fold `.` and `..` without touching the filesystem.
fn normalize(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn rooted(policy: Policy) -> Policy {
        policy.with_root("/work/project")
    }

    #[test]
    fn test_restrictive_denies_exec() {
        let policy = rooted(Policy::restrictive());
        let req = CapabilityRequest::exec("rm -rf /");
        assert!(!policy.check(&req).is_allowed());
    }

    #[test]
    fn test_allow_fs_read_in_workspace() {
        let policy = rooted(Policy::restrictive());
        let req = CapabilityRequest::fs_read("./src/main.rs");
        assert!(policy.check(&req).is_allowed());
        let abs = CapabilityRequest::fs_read("/work/project/notes.txt");
        assert!(policy.check(&abs).is_allowed());
    }

    #[test]
    fn test_parent_escape_is_denied() {
        let policy = rooted(Policy::restrictive());
        assert!(!policy.check(&CapabilityRequest::fs_read("../secrets")).is_allowed());
        assert!(
            !policy
                .check(&CapabilityRequest::fs_write("/work/project/../other/x"))
                .is_allowed()
        );
        // Sibling with a shared string prefix is not inside the root.
        assert!(
            !policy
                .check(&CapabilityRequest::fs_read("/work/project-old/x"))
                .is_allowed()
        );
    }

    #[test]
    fn test_restrictive_denies_delete() {
        let policy = rooted(Policy::restrictive());
        let decision = policy.check(&CapabilityRequest::fs_delete("./a.txt"));
        assert_eq!(
            decision,
            Decision::Deny {
                reason: "fs_delete is denied by policy".into()
            }
        );
    }

    #[test]
    fn test_standard_allows_tooling() {
        let policy = rooted(Policy::standard());
        assert!(policy.check(&CapabilityRequest::exec("python3")).is_allowed());
        assert!(policy.check(&CapabilityRequest::exec("dot -Tpng")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::exec("bash")).is_allowed());
        assert!(policy.check(&CapabilityRequest::net_http("api.open-meteo.com")).is_allowed());
        assert!(policy.check(&CapabilityRequest::fs_delete("old.txt")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::fs_delete("/etc/passwd")).is_allowed());
    }

    #[test]
    fn test_permissive_allows_everything() {
        let policy = Policy::permissive();
        assert!(policy.check(&CapabilityRequest::fs_delete("/tmp/x")).is_allowed());
        assert!(policy.check(&CapabilityRequest::exec("anything")).is_allowed());
    }

    #[test]
    fn test_single_level_glob() {
        let toml = r#"
root = "/data"

[allow]
fs_read = ["inbox/*"]
"#;
        let policy = Policy::parse(toml).unwrap();
        assert!(policy.check(&CapabilityRequest::fs_read("inbox/a.txt")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::fs_read("inbox/deep/a.txt")).is_allowed());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
root = "/home/me"

[allow]
fs_read = ["./", "/tmp/**"]
net_http = ["open-meteo.com"]

[deny]
all = ["exec"]
"#;
        let policy = Policy::parse(toml).unwrap();

        // Allowed
        assert!(policy.check(&CapabilityRequest::fs_read("./foo.txt")).is_allowed());
        assert!(policy.check(&CapabilityRequest::fs_read("/tmp/bar/baz")).is_allowed());
        assert!(
            policy
                .check(&CapabilityRequest::net_http("geocoding-api.open-meteo.com"))
                .is_allowed()
        );

        // Denied
        assert!(!policy.check(&CapabilityRequest::exec("ls")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::net_http("evil.com")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::fs_write("./foo.txt")).is_allowed());
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let err = Policy::parse("[deny]\nall = [\"teleport\"]\n").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_decision_into_result() {
        assert!(Decision::Allow.into_result().is_ok());
        let err = Decision::Deny {
            reason: "nope".into(),
        }
        .into_result()
        .unwrap_err();
        assert_eq!(err.to_string(), "capability denied: nope");
    }

    #[test]
    fn test_policy_roundtrips_through_json() {
        let policy = Policy::standard();
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["allow"]["exec"][0], "python3");
    }
}
