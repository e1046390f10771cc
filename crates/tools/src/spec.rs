//! Tool definitions exposed to the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool definition: name, description and JSON schema of its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

impl ToolSpec {
    /// Text describing the tool, used for semantic matching against prompts.
    ///
    /// Combines the humanised name, the description and the descriptions of
    /// each parameter.
    pub fn document(&self) -> String {
        let mut doc = format!("{}. {}", self.name.replace('_', " "), self.description);
        if let Some(props) = self.schema.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                doc.push(' ');
                doc.push_str(&name.replace('_', " "));
                if let Some(desc) = prop.get("description").and_then(Value::as_str) {
                    doc.push_str(": ");
                    doc.push_str(desc);
                }
                doc.push('.');
            }
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_includes_parameters() {
        let spec = ToolSpec {
            name: "get_weather".into(),
            description: "Current weather for a place.".into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string", "description": "City name"}
                }
            }),
        };
        let doc = spec.document();
        assert!(doc.starts_with("get weather. Current weather"));
        assert!(doc.contains("location: City name."));
    }
}
