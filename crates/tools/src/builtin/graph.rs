//! Graph visualisation through Graphviz DOT.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use policy::CapabilityRequest;
use serde_json::{Value, json};
use tokio::process::Command;

use crate::args::{optional_bool, optional_str};
use crate::{Tool, ToolContext, ToolError};

const DOT_COMMAND: &str = "dot";

/// Render nodes and edges to a DOT file, and to PNG when Graphviz is installed.
pub struct VisualizeGraph;

#[derive(Debug, Clone, PartialEq)]
struct Edge {
    from: String,
    to: String,
    label: Option<String>,
}

#[async_trait]
impl Tool for VisualizeGraph {
    fn name(&self) -> &str {
        "visualize_graph"
    }

    fn description(&self) -> &str {
        "Visualize a graph or network of nodes connected by edges (relationships, dependencies, flows). Saves a Graphviz .dot file and a .png image when Graphviz is installed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "edges": {
                    "type": "array",
                    "description": "Connections, each [from, to] or [from, to, label]",
                    "items": {"type": "array", "items": {"type": "string"}}
                },
                "nodes": {
                    "type": "array",
                    "description": "Extra node names, including ones without edges",
                    "items": {"type": "string"}
                },
                "directed": {"type": "boolean", "description": "Draw arrows (default: true)"},
                "title": {"type": "string", "description": "Graph title"},
                "name": {"type": "string", "description": "Output file name without extension (default: graph)"}
            },
            "required": ["edges"]
        })
    }

    fn capabilities(&self, args: &Value, ctx: &ToolContext) -> Vec<CapabilityRequest> {
        let name = optional_str(args, "name").unwrap_or("graph");
        vec![
            CapabilityRequest::fs_write(ctx.resolve(format!("{name}.dot")).display().to_string()),
            CapabilityRequest::fs_write(ctx.resolve(format!("{name}.png")).display().to_string()),
            CapabilityRequest::exec(format!("{DOT_COMMAND} -Tpng")),
        ]
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let edges = parse_edges(args.get("edges"))?;
        let mut nodes: BTreeSet<String> = match args.get("nodes") {
            Some(Value::Array(items)) => items.iter().map(node_name).collect(),
            _ => BTreeSet::new(),
        };
        for edge in &edges {
            nodes.insert(edge.from.clone());
            nodes.insert(edge.to.clone());
        }
        if nodes.is_empty() {
            return Err(ToolError::InvalidInput("graph has no nodes".into()));
        }

        let directed = optional_bool(&args, "directed").unwrap_or(true);
        let name = optional_str(&args, "name").unwrap_or("graph");
        let dot = render_dot(&nodes, &edges, directed, optional_str(&args, "title"));

        let dot_path = ctx.resolve(format!("{name}.dot"));
        if let Some(parent) = dot_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dot_path, &dot).await?;

        let png_path = ctx.resolve(format!("{name}.png"));
        let image = render_png(&dot_path, &png_path).await?;

        Ok(json!({
            "dot_file": dot_path.display().to_string(),
            "image_file": image,
            "node_count": nodes.len(),
            "edge_count": edges.len(),
        }))
    }
}

fn node_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_edges(value: Option<&Value>) -> Result<Vec<Edge>, ToolError> {
    let Some(Value::Array(items)) = value else {
        return Err(ToolError::InvalidInput("'edges' must be an array".into()));
    };

    items
        .iter()
        .map(|item| match item {
            Value::Array(pair) if pair.len() == 2 || pair.len() == 3 => Ok(Edge {
                from: node_name(&pair[0]),
                to: node_name(&pair[1]),
                label: pair.get(2).map(node_name),
            }),
            Value::Object(obj) => {
                let from = obj.get("from").or_else(|| obj.get("source"));
                let to = obj.get("to").or_else(|| obj.get("target"));
                match (from, to) {
                    (Some(from), Some(to)) => Ok(Edge {
                        from: node_name(from),
                        to: node_name(to),
                        label: obj.get("label").map(node_name),
                    }),
                    _ => Err(ToolError::InvalidInput(format!(
                        "edge needs 'from' and 'to': {item}"
                    ))),
                }
            }
            other => Err(ToolError::InvalidInput(format!("invalid edge: {other}"))),
        })
        .collect()
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn render_dot(nodes: &BTreeSet<String>, edges: &[Edge], directed: bool, title: Option<&str>) -> String {
    let (keyword, arrow) = if directed {
        ("digraph", "->")
    } else {
        ("graph", "--")
    };

    let mut out = format!("{keyword} G {{\n");
    if let Some(title) = title {
        out.push_str(&format!("    label={};\n    labelloc=t;\n", quote(title)));
    }
    out.push_str("    node [shape=ellipse];\n");
    for node in nodes {
        out.push_str(&format!("    {};\n", quote(node)));
    }
    for edge in edges {
        out.push_str(&format!("    {} {arrow} {}", quote(&edge.from), quote(&edge.to)));
        if let Some(label) = &edge.label {
            out.push_str(&format!(" [label={}]", quote(label)));
        }
        out.push_str(";\n");
    }
    out.push_str("}\n");
    out
}

/// Run Graphviz if present. A missing binary is not an error.
async fn render_png(dot_path: &Path, png_path: &Path) -> Result<Option<String>, ToolError> {
    let output = Command::new(DOT_COMMAND)
        .arg("-Tpng")
        .arg(dot_path)
        .arg("-o")
        .arg(png_path)
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => Ok(Some(png_path.display().to_string())),
        Ok(out) => Err(ToolError::Execution(format!(
            "graphviz failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        ))),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("graphviz not installed, skipping image rendering");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_objects() {
        let edges = parse_edges(Some(&json!([
            ["a", "b"],
            {"from": "b", "to": "c", "label": "calls"},
            {"source": 1, "target": 2}
        ])))
        .unwrap();
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[1].label.as_deref(), Some("calls"));
        assert_eq!(edges[2].from, "1");
        assert!(parse_edges(Some(&json!([["lonely"]]))).is_err());
        assert!(parse_edges(None).is_err());
    }

    #[test]
    fn renders_directed_dot() {
        let edges = vec![Edge {
            from: "web".into(),
            to: "db \"main\"".into(),
            label: Some("sql".into()),
        }];
        let nodes: BTreeSet<String> = ["web".to_string(), "db \"main\"".to_string()].into();
        let dot = render_dot(&nodes, &edges, true, Some("Stack"));
        assert!(dot.starts_with("digraph G {\n"));
        assert!(dot.contains("label=\"Stack\";"));
        assert!(dot.contains("\"web\" -> \"db \\\"main\\\"\" [label=\"sql\"];"));
    }

    #[test]
    fn renders_undirected_dot() {
        let nodes: BTreeSet<String> = ["a".to_string()].into();
        let dot = render_dot(&nodes, &[], false, None);
        assert!(dot.starts_with("graph G {\n"));
        assert!(!dot.contains("->"));
    }

    #[tokio::test]
    async fn writes_dot_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let out = VisualizeGraph
            .execute(
                json!({"edges": [["a", "b"], ["b", "c"]], "nodes": ["z"], "name": "deps"}),
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(out["node_count"], 4);
        assert_eq!(out["edge_count"], 2);
        let dot = std::fs::read_to_string(dir.path().join("deps.dot")).unwrap();
        assert!(dot.contains("\"a\" -> \"b\";"));
        assert!(dot.contains("\"z\";"));
    }

    #[tokio::test]
    async fn empty_graph_is_rejected() {
        let ctx = ToolContext::new(".");
        let err = VisualizeGraph
            .execute(json!({"edges": []}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::InvalidInput("graph has no nodes".into()));
    }
}
