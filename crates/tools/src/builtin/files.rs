//! Filesystem tools. All paths resolve against the context working directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use policy::CapabilityRequest;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;

use crate::args::{optional_str, optional_u64, required_str};
use crate::{Tool, ToolContext, ToolError};

const MAX_READ_CHARS: usize = 100_000;
const MAX_TREE_ENTRIES: usize = 500;

fn path_scope(args: &Value, key: &str, default: Option<&str>, ctx: &ToolContext) -> Option<String> {
    let raw = optional_str(args, key).or(default)?;
    Some(ctx.resolve(raw).display().to_string())
}

fn read_scope(args: &Value, key: &str, default: Option<&str>, ctx: &ToolContext) -> Vec<CapabilityRequest> {
    path_scope(args, key, default, ctx)
        .map(CapabilityRequest::fs_read)
        .into_iter()
        .collect()
}

fn write_scope(args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
    path_scope(args, "path", None, ctx)
        .map(CapabilityRequest::fs_write)
        .into_iter()
        .collect()
}

/// Write (or overwrite) a text file.
pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file, creating it (and missing parent directories) or overwriting it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to write"},
                "content": {"type": "string", "description": "Text to write into the file"}
            },
            "required": ["path", "content"]
        })
    }

    fn capabilities(&self, args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        write_scope(args, ctx)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = ctx.resolve(required_str(&args, "path")?);
        let content = required_str(&args, "content")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        Ok(json!(format!(
            "Wrote {} bytes to {}",
            content.len(),
            path.display()
        )))
    }
}

/// Read a text file.
pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the text contents of a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to read"}
            },
            "required": ["path"]
        })
    }

    fn capabilities(&self, args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        read_scope(args, "path", None, ctx)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = ctx.resolve(required_str(&args, "path")?);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| ToolError::Execution(format!("{}: {e}", path.display())))?;

        // Enough bytes for one char past the limit, even if every char is 4 bytes wide.
        let cap = (MAX_READ_CHARS as u64 + 1) * 4;
        let mut bytes = Vec::new();
        file.take(cap)
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| ToolError::Execution(format!("{}: {e}", path.display())))?;
        let text = String::from_utf8_lossy(&bytes);

        if text.chars().count() > MAX_READ_CHARS {
            let head: String = text.chars().take(MAX_READ_CHARS).collect();
            return Ok(json!(format!(
                "{head}\n... [truncated, showing first {MAX_READ_CHARS} chars]"
            )));
        }
        Ok(json!(text))
    }
}

/// List the entries of a directory.
pub struct ListFiles;

#[async_trait]
impl Tool for ListFiles {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the files and folders in a directory. Folders are marked with a trailing slash."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to list (default: current directory)"}
            }
        })
    }

    fn capabilities(&self, args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        read_scope(args, "path", Some("."), ctx)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let dir = ctx.resolve(optional_str(&args, "path").unwrap_or("."));
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ToolError::Execution(format!("{}: {e}", dir.display())))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();

        Ok(json!({
            "directory": dir.display().to_string(),
            "entries": names,
        }))
    }
}

/// Render a directory as an ASCII tree.
pub struct ShowDirectoryTree;

#[async_trait]
impl Tool for ShowDirectoryTree {
    fn name(&self) -> &str {
        "show_directory_tree"
    }

    fn description(&self) -> &str {
        "Show the folder structure of a directory as a tree, skipping hidden files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Root directory (default: current directory)"},
                "max_depth": {"type": "integer", "description": "How many levels deep to descend (default: 3)"}
            }
        })
    }

    fn capabilities(&self, args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        read_scope(args, "path", Some("."), ctx)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let root = ctx.resolve(optional_str(&args, "path").unwrap_or("."));
        let max_depth = optional_u64(&args, "max_depth")?.unwrap_or(3) as usize;

        if !root.is_dir() {
            return Err(ToolError::Execution(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let tree = tokio::task::spawn_blocking(move || render_tree(&root, max_depth))
            .await
            .map_err(ToolError::execution)??;
        Ok(json!(tree))
    }
}

fn render_tree(root: &Path, max_depth: usize) -> Result<String, ToolError> {
    let label = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    let mut out = format!("{label}/\n");
    let mut count = 0;
    walk(root, "", 1, max_depth, &mut out, &mut count)?;
    if count >= MAX_TREE_ENTRIES {
        out.push_str("... (truncated)\n");
    }
    Ok(out)
}

fn walk(
    dir: &Path,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    out: &mut String,
    count: &mut usize,
) -> Result<(), ToolError> {
    if depth > max_depth {
        return Ok(());
    }

    let mut entries: Vec<(String, PathBuf, bool)> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (name, e.path(), is_dir)
        })
        .filter(|(name, _, _)| !name.starts_with('.'))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let last = entries.len().saturating_sub(1);
    for (i, (name, path, is_dir)) in entries.into_iter().enumerate() {
        if *count >= MAX_TREE_ENTRIES {
            return Ok(());
        }
        *count += 1;

        let (branch, extension) = if i == last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        out.push_str(prefix);
        out.push_str(branch);
        out.push_str(&name);
        if is_dir {
            out.push('/');
        }
        out.push('\n');

        if is_dir {
            walk(
                &path,
                &format!("{prefix}{extension}"),
                depth + 1,
                max_depth,
                out,
                count,
            )?;
        }
    }
    Ok(())
}

/// Change the working directory used by subsequent tool calls.
pub struct ChangeDirectory;

#[async_trait]
impl Tool for ChangeDirectory {
    fn name(&self) -> &str {
        "change_directory"
    }

    fn description(&self) -> &str {
        "Change the current working directory for subsequent file operations."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to switch to"}
            },
            "required": ["path"]
        })
    }

    fn capabilities(&self, args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        read_scope(args, "path", None, ctx)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let dir = ctx.resolve(required_str(&args, "path")?);
        if !tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(ToolError::Execution(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        tracing::debug!(cwd = %dir.display(), "changed directory");
        ctx.set_cwd(dir.clone());
        Ok(json!(format!("Current directory is now {}", dir.display())))
    }
}

/// Append text to a file.
pub struct AppendToFile;

#[async_trait]
impl Tool for AppendToFile {
    fn name(&self) -> &str {
        "append_to_file"
    }

    fn description(&self) -> &str {
        "Append text content to the end of a file, creating the file if it does not exist."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to append to"},
                "content": {"type": "string", "description": "Text to append"}
            },
            "required": ["path", "content"]
        })
    }

    fn capabilities(&self, args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        write_scope(args, ctx)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        use tokio::io::AsyncWriteExt;

        let path = ctx.resolve(required_str(&args, "path")?);
        let content = required_str(&args, "content")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        Ok(json!(format!(
            "Appended {} bytes to {}",
            content.len(),
            path.display()
        )))
    }
}

/// Delete a single file.
pub struct DeleteFile;

#[async_trait]
impl Tool for DeleteFile {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file. Directories are not removed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to delete"}
            },
            "required": ["path"]
        })
    }

    fn capabilities(&self, args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        path_scope(args, "path", None, ctx)
            .map(CapabilityRequest::fs_delete)
            .into_iter()
            .collect()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = ctx.resolve(required_str(&args, "path")?);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ToolError::Execution(format!("{}: {e}", path.display())))?;
        if meta.is_dir() {
            return Err(ToolError::InvalidInput(format!(
                "{} is a directory",
                path.display()
            )));
        }
        tokio::fs::remove_file(&path).await?;
        Ok(json!(format!("Deleted {}", path.display())))
    }
}
