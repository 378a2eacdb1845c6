//! Tool system: the [`Tool`] trait, argument validation, and registry.
//!
//! Tools are described to the model by name, description, and a JSON
//! Schema of their arguments. The dispatcher validates arguments against
//! the schema before invocation; validation and execution failures are
//! fed back to the model as tool messages rather than ending the turn.

pub mod builtin;
pub mod registry;
pub mod voice;

pub use registry::ToolRegistry;
pub use voice::{Voice, VoiceState};

use crate::error::{AgentError, Result};

/// A capability the model can invoke by name.
///
/// Implementations must be `Send + Sync`; execution is synchronous and
/// runs on the blocking pool under the dispatcher's timeout.
pub trait Tool: Send + Sync {
    /// The function name exposed to the model.
    ///
    /// Names must not contain underscores so they survive the splitter's
    /// markdown cleaning if the model ever echoes them as text.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn schema(&self) -> serde_json::Value;

    /// Execute with validated arguments, returning the result string.
    fn invoke(&self, args: serde_json::Value) -> Result<String>;
}

/// Validate a raw JSON arguments string against a tool's schema.
///
/// Checks that the string parses, that all `required` fields are
/// present, and that fields declared in `properties` have the declared
/// type. Fields outside the schema are allowed.
pub fn validate_args(
    tool_name: &str,
    args_json: &str,
    schema: &serde_json::Value,
) -> Result<serde_json::Value> {
    let args_json = if args_json.trim().is_empty() {
        "{}"
    } else {
        args_json
    };
    let value: serde_json::Value = serde_json::from_str(args_json).map_err(|e| {
        AgentError::Tool(format!("tool '{tool_name}': invalid JSON arguments: {e}"))
    })?;

    let schema_type = schema.get("type").and_then(|t| t.as_str()).unwrap_or("");
    if schema_type != "object" {
        return Ok(value);
    }

    let obj = value.as_object().ok_or_else(|| {
        AgentError::Tool(format!(
            "tool '{tool_name}': expected object arguments, got {}",
            json_type_name(&value)
        ))
    })?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required {
            if let Some(name) = field.as_str()
                && !obj.contains_key(name)
            {
                return Err(AgentError::Tool(format!(
                    "tool '{tool_name}': missing required field '{name}'"
                )));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, val) in obj {
            if let Some(prop) = properties.get(key) {
                let expected = prop.get("type").and_then(|t| t.as_str()).unwrap_or("");
                if !expected.is_empty() && !type_matches(val, expected) {
                    return Err(AgentError::Tool(format!(
                        "tool '{tool_name}': field '{key}' expected {expected}, got {}",
                        json_type_name(val)
                    )));
                }
            }
        }
    }

    Ok(value)
}

fn type_matches(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
