//! Tools advertised by the remote host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the remote host says it can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, as passed to `invoke`
    pub name: String,
    /// Human readable summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolDescriptor {
    /// A descriptor with no description.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Read a listing result.
///
/// Accepts an array of names, an array of `{name, description}` objects, or
/// either of those under a `tools` key. Entries without a usable name are
/// skipped.
pub fn parse_tool_listing(value: &Value) -> Result<Vec<ToolDescriptor>, String> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(object) => match object.get("tools") {
            Some(Value::Array(entries)) => entries,
            _ => return Err("listing object has no 'tools' array".to_string()),
        },
        other => return Err(format!("unexpected listing shape: {other}")),
    };

    Ok(entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(ToolDescriptor::named(name.clone())),
            Value::Object(object) => {
                let name = object.get("name")?.as_str()?;
                Some(ToolDescriptor {
                    name: name.to_string(),
                    description: object
                        .get("description")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                })
            }
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn accepts_every_listing_shape() {
        let expected = vec![ToolDescriptor::named("echo"), ToolDescriptor::named("summarize")];
        assert_eq!(parse_tool_listing(&json!(["echo", "summarize"])).unwrap(), expected);
        assert_eq!(
            parse_tool_listing(&json!({"tools": [{"name": "echo"}, {"name": "summarize"}]})).unwrap(),
            expected
        );
    }

    #[test]
    fn keeps_descriptions_and_skips_junk() {
        let tools = parse_tool_listing(&json!([
            {"name": "search", "description": "Full-text search"},
            {"description": "nameless"},
            42
        ]))
        .unwrap();
        assert_eq!(
            tools,
            vec![ToolDescriptor {
                name: "search".into(),
                description: Some("Full-text search".into())
            }]
        );
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(parse_tool_listing(&json!("echo")).is_err());
        assert!(parse_tool_listing(&json!({"names": []})).is_err());
    }
}
