//! MCP message dispatch, shared by the SSE transport and `POST /mcp`.
//!
//! Supported methods:
//! - `initialize` - protocol version negotiation + server info
//! - `notifications/*` - accepted, never answered
//! - `ping`
//! - `tools/list` - the deployment's read-only tools
//! - `tools/call` - run one tool; failures come back as `isError` results

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{json, Value};

use super::protocol::{
    json_rpc_error, json_rpc_result, negotiate_version, tool_failure, tool_success, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::auth::ClientLabel;
use crate::state::AppState;

/// Handle one decoded message (object or batch). `None` when nothing needs
/// to be sent back, i.e. the input held only notifications.
pub async fn handle_message(state: &AppState, client: &ClientLabel, message: Value) -> Option<Value> {
    match message {
        Value::Array(batch) if batch.is_empty() => {
            Some(json_rpc_error(Value::Null, INVALID_REQUEST, "Empty batch"))
        }
        Value::Array(batch) => {
            let mut responses = Vec::with_capacity(batch.len());
            for item in batch {
                if let Some(r) = handle_single(state, client, item).await {
                    responses.push(r);
                }
            }
            (!responses.is_empty()).then_some(Value::Array(responses))
        }
        single => handle_single(state, client, single).await,
    }
}

async fn handle_single(state: &AppState, client: &ClientLabel, request: Value) -> Option<Value> {
    let Some(obj) = request.as_object() else {
        return Some(json_rpc_error(Value::Null, INVALID_REQUEST, "Invalid Request"));
    };
    let id = obj.get("id").cloned();
    let method = obj.get("method").and_then(|m| m.as_str());

    let Some(method) = method.filter(|_| obj.get("jsonrpc").and_then(|v| v.as_str()) == Some("2.0")) else {
        // Responses from the client (e.g. to server pings) carry no method.
        if id.is_some() && (obj.contains_key("result") || obj.contains_key("error")) {
            return None;
        }
        return Some(json_rpc_error(id.unwrap_or(Value::Null), INVALID_REQUEST, "Invalid Request"));
    };

    let Some(id) = id else {
        tracing::debug!(client = %client, method = %method, "MCP notification");
        return None;
    };

    tracing::debug!(client = %client, method = %method, "MCP request");

    let params = obj.get("params").cloned().unwrap_or(json!({}));
    let response = match method {
        "initialize" => handle_initialize(state, &params, id),
        "ping" => json_rpc_result(id, json!({})),
        "tools/list" => json_rpc_result(id, json!({ "tools": state.tools.definitions() })),
        "tools/call" => handle_tools_call(state, client, &params, id).await,
        _ => json_rpc_error(id, METHOD_NOT_FOUND, &format!("Method not found: {method}")),
    };
    Some(response)
}

// ── initialize ──────────────────────────────────────────────────────────────

fn handle_initialize(state: &AppState, params: &Value, id: Value) -> Value {
    let requested = params.get("protocolVersion").and_then(|v| v.as_str());
    json_rpc_result(
        id,
        json!({
            "protocolVersion": negotiate_version(requested),
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": state.kind.server_name(),
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": "Read-only tools. Every call is authorized by a static client token and limited by server-side policy."
        }),
    )
}

// ── tools/call ──────────────────────────────────────────────────────────────

async fn handle_tools_call(state: &AppState, client: &ClientLabel, params: &Value, id: Value) -> Value {
    let tool_name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
    if tool_name.is_empty() {
        return json_rpc_error(id, INVALID_PARAMS, "Missing 'name' in params");
    }
    if !state.tools.has_tool(tool_name) {
        return json_rpc_error(id, INVALID_PARAMS, &format!("Unknown tool: {tool_name}"));
    }
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    let started = std::time::Instant::now();
    let result = state.tools.call(tool_name, arguments).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(payload) => {
            tracing::info!(client = %client, tool = %tool_name, elapsed_ms, "tool call succeeded");
            json_rpc_result(id, tool_success(payload))
        }
        Err(e) => {
            tracing::warn!(client = %client, tool = %tool_name, elapsed_ms, "tool call failed: {}", e);
            json_rpc_result(id, tool_failure(&e.to_string()))
        }
    }
}

// ── POST /mcp ───────────────────────────────────────────────────────────────

/// Direct JSON-RPC over HTTP: the response is the HTTP body.
#[utoipa::path(post, path = "/mcp", tag = "mcp",
    request_body(content = String, content_type = "application/json", description = "JSON-RPC 2.0 message or batch"),
    responses(
        (status = 200, description = "JSON-RPC response"),
        (status = 202, description = "Notification accepted"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = []))
)]
pub async fn mcp_handler(
    State(state): State<AppState>,
    Extension(client): Extension<ClientLabel>,
    body: Bytes,
) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return Json(json_rpc_error(Value::Null, PARSE_ERROR, &format!("Parse error: {e}"))).into_response();
        }
    };

    match handle_message(&state, &client, message).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
