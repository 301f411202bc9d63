//! Secret Manager `versions:access` - used at start-up to load the client
//! token allowlist when it is not injected through the environment.

use std::sync::Arc;

use base64::Engine;
use reqwest::Client;
use serde_json::Value;

use super::AccessTokenProvider;
use crate::error::ToolError;

const DEFAULT_BASE_URL: &str = "https://secretmanager.googleapis.com/v1";

pub struct SecretManagerClient {
    client: Client,
    base_url: String,
    credentials: Arc<AccessTokenProvider>,
}

impl SecretManagerClient {
    pub fn new(client: Client, credentials: Arc<AccessTokenProvider>) -> Self {
        Self::with_base_url(client, credentials, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: Client, credentials: Arc<AccessTokenProvider>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Read the UTF-8 payload of `projects/{project}/secrets/{name}/versions/{version}`.
    pub async fn access(&self, project: &str, name: &str, version: &str) -> Result<String, ToolError> {
        let url = format!(
            "{}/projects/{}/secrets/{}/versions/{}:access",
            self.base_url, project, name, version
        );
        let token = self.credentials.token().await?;

        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ToolError::transport("secretmanager", e))?;

        if !resp.status().is_success() {
            return Err(super::google_error("secretmanager", resp).await);
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ToolError::transport("secretmanager", e))?;
        let encoded = body
            .pointer("/payload/data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| ToolError::upstream("secretmanager", None, "response has no payload.data"))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ToolError::upstream("secretmanager", None, format!("payload is not base64: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|_| ToolError::upstream("secretmanager", None, "payload is not valid UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SecretManagerClient {
        let creds = Arc::new(AccessTokenProvider::fixed(Client::new(), "ya29.test"));
        SecretManagerClient::with_base_url(Client::new(), creds, &server.uri())
    }

    #[tokio::test]
    async fn access_decodes_payload() {
        let server = MockServer::start().await;
        let payload = base64::engine::general_purpose::STANDARD.encode(r#"{"ci":"tok"}"#);
        Mock::given(method("GET"))
            .and(path("/projects/acme/secrets/mcp-tokens/versions/latest:access"))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/1/secrets/mcp-tokens/versions/3",
                "payload": { "data": payload }
            })))
            .mount(&server)
            .await;

        let value = client(&server).access("acme", "mcp-tokens", "latest").await.unwrap();
        assert_eq!(value, r#"{"ci":"tok"}"#);
    }

    #[tokio::test]
    async fn permission_denied_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "Permission denied on secret", "status": "PERMISSION_DENIED" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).access("acme", "mcp-tokens", "latest").await.unwrap_err();
        assert_eq!(err.upstream_status(), Some(403));
        assert!(err.to_string().contains("Permission denied on secret"));
    }
}
