// Shared fixtures for the integration tests: app state wired to wiremock
// upstreams and small request/response helpers.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use readonly_mcp_gateway::auth::TokenStore;
use readonly_mcp_gateway::bigquery::BigQueryService;
use readonly_mcp_gateway::config::{BigQuerySettings, GitHubSettings, ServiceKind};
use readonly_mcp_gateway::gcp::AccessTokenProvider;
use readonly_mcp_gateway::github::GitHubService;
use readonly_mcp_gateway::state::AppState;
use readonly_mcp_gateway::tools::{BigQueryTools, GitHubTools, Toolset};

pub const TOKEN: &str = "test-token-a";
pub const OTHER_TOKEN: &str = "test-token-b";
/// Never reached; used when a test makes no upstream calls.
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

pub fn tokens() -> TokenStore {
    TokenStore::from_json(&format!(r#"{{"copilot-test":"{TOKEN}","n8n-prod":"{OTHER_TOKEN}"}}"#)).unwrap()
}

pub fn github_settings(base_url: &str, allowed_repos: Option<&str>) -> GitHubSettings {
    GitHubSettings {
        api_base_url: base_url.to_string(),
        user_agent: "mcp-github-server/test".to_string(),
        timeout: Duration::from_secs(5),
        token: Some("ghp_test".to_string()),
        max_repos_scan: 25,
        max_commits_return: 20,
        allowed_repos: allowed_repos.map(str::to_string),
    }
}

pub fn bigquery_settings(base_url: &str) -> BigQuerySettings {
    BigQuerySettings {
        project_id: "acme".to_string(),
        location: Some("US".to_string()),
        max_bytes_billed: 5_000_000_000,
        default_limit: 500,
        max_return_rows: 1000,
        api_base_url: base_url.to_string(),
        query_timeout: Duration::from_secs(5),
    }
}

pub fn github_state_with(settings: GitHubSettings, max_sessions: usize) -> AppState {
    let service = GitHubService::from_settings(&settings).unwrap();
    let tools = GitHubTools::new(service, &settings).unwrap();
    AppState::from_parts(ServiceKind::GitHub, Toolset::GitHub(tools), tokens(), false, max_sessions)
}

pub fn github_state(base_url: &str, allowed_repos: Option<&str>) -> AppState {
    github_state_with(github_settings(base_url, allowed_repos), 10)
}

pub fn bigquery_state_with(settings: BigQuerySettings) -> AppState {
    let creds = Arc::new(AccessTokenProvider::fixed(reqwest::Client::new(), "ya29.test"));
    let service = BigQueryService::new(reqwest::Client::new(), &settings, creds).unwrap();
    let tools = BigQueryTools::new(service, &settings);
    AppState::from_parts(ServiceKind::BigQuery, Toolset::BigQuery(tools), tokens(), false, 10)
}

pub fn bigquery_state(base_url: &str) -> AppState {
    bigquery_state_with(bigquery_settings(base_url))
}

pub fn app(state: AppState) -> axum::Router {
    readonly_mcp_gateway::create_router(state, true)
}

/// Collect a response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn mcp_request(token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// `tools/call` over `POST /mcp`; returns the JSON-RPC `result`.
pub async fn call_tool(app: &axum::Router, name: &str, arguments: Value) -> Value {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    });
    let response = app
        .clone()
        .oneshot(mcp_request(Some(TOKEN), &request))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert!(body.get("error").is_none(), "unexpected JSON-RPC error: {body}");
    body["result"].clone()
}

/// Text of the first content block of a tool result.
pub fn result_text(result: &Value) -> String {
    result["content"][0]["text"].as_str().unwrap_or_default().to_string()
}
