use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{Map, Value, json};

use crate::args::{optional_bool, required_str};
use crate::{Tool, ToolContext, ToolError};

const MAX_MATCHES: usize = 100;

/// Try a regular expression against sample text.
pub struct TestRegexPattern;

#[async_trait]
impl Tool for TestRegexPattern {
    fn name(&self) -> &str {
        "test_regex_pattern"
    }

    fn description(&self) -> &str {
        "Test a regular expression pattern against a text and list every match with its position and capture groups."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regular expression pattern"},
                "text": {"type": "string", "description": "Text to search"},
                "case_insensitive": {"type": "boolean", "description": "Ignore letter case (default: false)"}
            },
            "required": ["pattern", "text"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let pattern = required_str(&args, "pattern")?;
        let text = required_str(&args, "text")?;
        let case_insensitive = optional_bool(&args, "case_insensitive").unwrap_or(false);

        let re = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| ToolError::InvalidInput(format!("invalid pattern: {e}")))?;

        let names: Vec<Option<&str>> = re.capture_names().collect();
        let mut matches = Vec::new();
        let mut total = 0;

        for caps in re.captures_iter(text) {
            total += 1;
            if matches.len() >= MAX_MATCHES {
                continue;
            }
            let Some(whole) = caps.get(0) else {
                continue;
            };

            let groups: Vec<Value> = (1..caps.len())
                .map(|i| caps.get(i).map(|m| json!(m.as_str())).unwrap_or(Value::Null))
                .collect();

            let mut named = Map::new();
            for (i, name) in names.iter().enumerate() {
                if let Some(name) = name {
                    let value = caps.get(i).map(|m| json!(m.as_str())).unwrap_or(Value::Null);
                    named.insert((*name).to_string(), value);
                }
            }

            matches.push(json!({
                "match": whole.as_str(),
                "start": whole.start(),
                "end": whole.end(),
                "groups": groups,
                "named_groups": named,
            }));
        }

        Ok(json!({
            "is_match": total > 0,
            "match_count": total,
            "matches": matches,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(args: Value) -> Result<Value, ToolError> {
        TestRegexPattern.execute(args, &ToolContext::new(".")).await
    }

    #[tokio::test]
    async fn reports_matches_and_groups() {
        let out = run(json!({
            "pattern": r"(?P<user>\w+)@(\w+)\.com",
            "text": "mail alice@example.com or bob@test.com"
        }))
        .await
        .unwrap();

        assert_eq!(out["is_match"], true);
        assert_eq!(out["match_count"], 2);
        assert_eq!(out["matches"][0]["match"], "alice@example.com");
        assert_eq!(out["matches"][0]["start"], 5);
        assert_eq!(out["matches"][0]["groups"], json!(["alice", "example"]));
        assert_eq!(out["matches"][1]["named_groups"]["user"], "bob");
    }

    #[tokio::test]
    async fn case_insensitive_flag() {
        let out = run(json!({"pattern": "rust", "text": "Rust RUST", "case_insensitive": true}))
            .await
            .unwrap();
        assert_eq!(out["match_count"], 2);

        let out = run(json!({"pattern": "rust", "text": "Rust RUST"})).await.unwrap();
        assert_eq!(out["is_match"], false);
    }

    #[tokio::test]
    async fn invalid_pattern_is_input_error() {
        let err = run(json!({"pattern": "(unclosed", "text": "x"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
