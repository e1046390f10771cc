use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability types that can be granted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    FsRead,
    FsWrite,
    FsDelete,
    NetHttp,
    Exec,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FsRead => "fs_read",
            Self::FsWrite => "fs_write",
            Self::FsDelete => "fs_delete",
            Self::NetHttp => "net_http",
            Self::Exec => "exec",
        };
        f.write_str(name)
    }
}

/// A capability request with optional scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRequest {
    pub kind: CapabilityKind,
    pub scope: Option<String>, // path, host or command line
}

impl CapabilityRequest {
    pub fn new(kind: CapabilityKind) -> Self {
        Self { kind, scope: None }
    }

    pub fn with_scope(kind: CapabilityKind, scope: impl Into<String>) -> Self {
        Self {
            kind,
            scope: Some(scope.into()),
        }
    }

    pub fn fs_read(path: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::FsRead, path)
    }

    pub fn fs_write(path: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::FsWrite, path)
    }

    pub fn fs_delete(path: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::FsDelete, path)
    }

    pub fn net_http(host: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::NetHttp, host)
    }

    pub fn exec(command: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::Exec, command)
    }
}

impl fmt::Display for CapabilityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}({scope})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}
