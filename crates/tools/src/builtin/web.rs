//! Fetch a web page and reduce it to readable text.

use std::sync::LazyLock;

use async_trait::async_trait;
use policy::CapabilityRequest;
use regex::Regex;
use serde_json::{Value, json};

use crate::args::required_str;
use crate::{Tool, ToolContext, ToolError, host_of};

const MAX_CHARS: usize = 20_000;

static SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("static regex"));
static STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("static regex"));
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

/// Open a URL and return its text content.
pub struct OpenAndReadWebsite;

#[async_trait]
impl Tool for OpenAndReadWebsite {
    fn name(&self) -> &str {
        "open_and_read_website"
    }

    fn description(&self) -> &str {
        "Open a website URL and read its text content. Useful for reading articles, documentation or any web page."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Full http(s) URL of the page"}
            },
            "required": ["url"]
        })
    }

    fn capabilities(&self, args: &Value, _ctx: &ToolContext) -> Vec<CapabilityRequest> {
        args.get("url")
            .and_then(Value::as_str)
            .and_then(host_of)
            .map(CapabilityRequest::net_http)
            .into_iter()
            .collect()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let url = required_str(&args, "url")?;
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ToolError::InvalidInput(format!("invalid url '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ToolError::InvalidInput(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let response = ctx.http().get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Execution(format!("HTTP error: {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;

        let text = if content_type.contains("html") {
            html_to_text(&body)
        } else {
            body
        };

        Ok(json!(truncate(&text, MAX_CHARS)))
    }
}

fn html_to_text(html: &str) -> String {
    let text = SCRIPT.replace_all(html, " ");
    let text = STYLE.replace_all(&text, " ");
    let text = COMMENT.replace_all(&text, " ");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Basic HTML entity decoding.
fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!(
            "{}... [content truncated, showing first {max} chars]",
            &text[..idx]
        ),
        None => text.to_string(),
    }
}
