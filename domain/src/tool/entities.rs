//! Tool domain entities

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// A live tool process as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// App name the tool registered with.
    pub tool_name: String,
    /// Loopback port the tool listens on.
    pub port: u16,
    /// Cleared when a dial fails; the entry is then dropped.
    pub alive: bool,
}

impl Endpoint {
    pub fn new(tool_name: impl Into<String>, port: u16) -> Self {
        Self {
            tool_name: tool_name.into(),
            port,
            alive: true,
        }
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

/// Function schema advertised to the LLM, in the OpenAI tools format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// App that implements the function. Filled in by the catalog.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the parameter record.
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ToolSchema {
    pub fn new(
        app: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Render as an OpenAI `tools[]` entry.
    pub fn to_openai(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Validate an app name: an ASCII identifier starting with an uppercase letter.
pub fn validate_app_name(name: &str) -> Result<(), DomainError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DomainError::InvalidAppName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_address_is_loopback() {
        let ep = Endpoint::new("Calendar", 8101);
        assert_eq!(ep.address(), "127.0.0.1:8101");
        assert!(ep.alive);
    }

    #[test]
    fn schema_renders_openai_function() {
        let schema = ToolSchema::new(
            "Activities",
            "ShowActivityStatistic",
            "Show stats",
            serde_json::json!({"type":"object","properties":{"ActivityID":{"type":"string"}}}),
        );
        let v = schema.to_openai();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "ShowActivityStatistic");
        assert_eq!(
            v["function"]["parameters"]["properties"]["ActivityID"]["type"],
            "string"
        );
    }

    #[test]
    fn schema_defaults_parameters() {
        let schema: ToolSchema = serde_json::from_str(r#"{"name":"Ping"}"#).unwrap();
        assert_eq!(schema.parameters["type"], "object");
        assert!(schema.app.is_empty());
    }

    #[test]
    fn app_names_are_identifiers() {
        assert!(validate_app_name("Calendar").is_ok());
        assert!(validate_app_name("Map_2").is_ok());
        assert!(validate_app_name("calendar").is_err());
        assert!(validate_app_name("Cal/../x").is_err());
        assert!(validate_app_name("").is_err());
    }
}
