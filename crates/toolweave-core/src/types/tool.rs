//! Tool, tool-call and tool-result types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Error text carried by results of calls that were cancelled
pub const CANCELLED_MESSAGE: &str = "Tool call was cancelled";

/// JSON schema describing a tool's arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type", default = "default_schema_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn default_schema_type() -> String {
    "object".to_string()
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self::object()
    }
}

impl ToolInputSchema {
    /// An empty object schema
    pub fn object() -> Self {
        Self {
            schema_type: default_schema_type(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    /// Build a schema from a raw provider document, defaulting whatever is
    /// missing or malformed
    pub fn from_value(value: &Value) -> Self {
        let schema_type = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(default_schema_type);
        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let required = value
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            schema_type,
            properties,
            required,
        }
    }

    /// Add a property
    pub fn with_property(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Mark a property as required
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Render as a JSON schema document
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "type": self.schema_type,
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// A tool discovered on a connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorTool {
    /// Name exposed to the model, unique across the aggregate
    pub name: String,
    /// Name the provider knows the tool by
    pub original_name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
    pub connector_id: String,
    pub connector_name: String,
}

impl ConnectorTool {
    /// Create a tool whose display name equals its original name
    pub fn new(
        connector_id: impl Into<String>,
        connector_name: impl Into<String>,
        original_name: impl Into<String>,
        description: impl Into<String>,
        input_schema: ToolInputSchema,
    ) -> Self {
        let original_name = original_name.into();
        Self {
            name: original_name.clone(),
            original_name,
            description: description.into(),
            input_schema,
            connector_id: connector_id.into(),
            connector_name: connector_name.into(),
        }
    }

    /// Override the exposed name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The definition sent to the model
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.to_value(),
        }
    }
}

/// Tool definition as handed to a model provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A tool invocation requested by the model, before resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A resolved tool invocation bound to a connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub connector_id: String,
    /// Exposed name
    pub tool_name: String,
    pub original_tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Bind a model request to a resolved tool. A fresh id is generated when
    /// the model did not supply one. Non-object arguments become an empty map.
    pub fn resolve(request: &ToolCallRequest, tool: &ConnectorTool) -> Self {
        let id = request
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4()));

        Self {
            id,
            connector_id: tool.connector_id.clone(),
            tool_name: tool.name.clone(),
            original_tool_name: tool.original_name.clone(),
            arguments: request.arguments.as_object().cloned().unwrap_or_default(),
        }
    }

    /// Get an argument as a string
    pub fn get_arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    /// Get an argument as a u64
    pub fn get_arg_u64(&self, key: &str) -> Option<u64> {
        self.arguments.get(key).and_then(Value::as_u64)
    }
}

/// Outcome of one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    Success { content: String },
    Failure { error: String, retryable: bool },
}

/// Result of one tool call, paired with the call by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
    #[serde(rename = "durationMs", with = "duration_ms")]
    pub duration: Duration,
}

impl ToolResult {
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Success {
                content: content.into(),
            },
            duration,
        }
    }

    pub fn failure(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
        retryable: bool,
        duration: Duration,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Failure {
                error: error.into(),
                retryable,
            },
            duration,
        }
    }

    /// A non-retryable failure marking a call that never ran or was discarded
    pub fn cancelled(call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self::failure(call_id, tool_name, CANCELLED_MESSAGE, false, Duration::ZERO)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&self.outcome, ToolOutcome::Failure { error, .. } if error == CANCELLED_MESSAGE)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure { retryable: true, .. })
    }

    /// Content on success, error message on failure
    pub fn text(&self) -> &str {
        match &self.outcome {
            ToolOutcome::Success { content } => content,
            ToolOutcome::Failure { error, .. } => error,
        }
    }
}

/// One model turn's tool calls and their results, in matching order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionRound {
    pub tool_calls: Vec<ToolCall>,
    pub results: Vec<ToolResult>,
    /// Assistant text produced before the calls
    pub assistant_text: String,
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
