// ---------------------------------------------------------------------------
// tools/ - Read-only MCP tools exposed by each deployment
// ---------------------------------------------------------------------------

pub mod bigquery;
pub mod github;

pub use bigquery::BigQueryTools;
pub use github::GitHubTools;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::ToolError;

/// The tool set of the running deployment.
pub enum Toolset {
    GitHub(GitHubTools),
    BigQuery(BigQueryTools),
}

impl Toolset {
    /// MCP `Tool` descriptors for `tools/list`.
    pub fn definitions(&self) -> Vec<Value> {
        match self {
            Toolset::GitHub(_) => github::definitions(),
            Toolset::BigQuery(_) => bigquery::definitions(),
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.definitions().iter().any(|d| d["name"] == name)
    }

    /// Run one tool. Unknown names are reported as invalid arguments; the
    /// dispatcher checks [`Toolset::has_tool`] first.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        match self {
            Toolset::GitHub(tools) => tools.call(name, arguments).await,
            Toolset::BigQuery(tools) => tools.call(name, arguments).await,
        }
    }
}

/// Build a single MCP tool object.
pub(crate) fn tool_def(name: &str, description: &str, input_schema: Value) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": input_schema,
    })
}

/// Deserialize tool arguments; a missing `arguments` object counts as `{}`.
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| ToolError::invalid(format!("Invalid arguments: {e}")))
}

/// Trimmed value of a required string parameter.
pub(crate) fn required(name: &str, value: &str) -> Result<String, ToolError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ToolError::invalid(format!("{name} is required")));
    }
    Ok(value.to_string())
}

/// Trimmed value of an optional string parameter; blank counts as absent.
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
