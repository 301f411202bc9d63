// ---------------------------------------------------------------------------
// state.rs - Application state shared by every handler
// ---------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenStore;
use crate::bigquery::BigQueryService;
use crate::config::{ServiceKind, ServiceSettings, Settings, TokenSource};
use crate::error::ConfigError;
use crate::gcp::{AccessTokenProvider, SecretManagerClient};
use crate::github::GitHubService;
use crate::mcp::SessionRegistry;
use crate::tools::{BigQueryTools, GitHubTools, Toolset};

/// Central application state. Clone-friendly; everything shared sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub kind: ServiceKind,
    pub tools: Arc<Toolset>,
    pub tokens: Arc<TokenStore>,
    pub allow_query_param_token: bool,
    pub sessions: Arc<SessionRegistry>,
    /// Cancelled on shutdown; ends every open SSE stream.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build clients and load the token allowlist. Fails on any configuration
    /// problem so the process never serves with a broken setup.
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let gcp_client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        let credentials = Arc::new(AccessTokenProvider::from_settings(gcp_client.clone(), &settings.gcp));

        let tokens = load_tokens(&settings.tokens, || {
            SecretManagerClient::new(gcp_client.clone(), Arc::clone(&credentials))
        })
        .await?;

        let tools = match &settings.service {
            ServiceSettings::GitHub(gh) => {
                Toolset::GitHub(GitHubTools::new(GitHubService::from_settings(gh)?, gh)?)
            }
            ServiceSettings::BigQuery(bq) => {
                let service = BigQueryService::new(gcp_client.clone(), bq, Arc::clone(&credentials))?;
                Toolset::BigQuery(BigQueryTools::new(service, bq))
            }
        };

        tracing::info!(
            service = settings.kind().server_name(),
            clients = tokens.len(),
            max_sessions = settings.max_sessions,
            "AppState initialised"
        );

        Ok(Self::from_parts(
            settings.kind(),
            tools,
            tokens,
            settings.allow_query_param_token,
            settings.max_sessions,
        ))
    }

    /// Assemble state from already-built parts (integration tests use this).
    pub fn from_parts(
        kind: ServiceKind,
        tools: Toolset,
        tokens: TokenStore,
        allow_query_param_token: bool,
        max_sessions: usize,
    ) -> Self {
        Self {
            kind,
            tools: Arc::new(tools),
            tokens: Arc::new(tokens),
            allow_query_param_token,
            sessions: Arc::new(SessionRegistry::new(max_sessions)),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Resolve the client token allowlist. The Secret Manager client is only
/// built when the secret actually has to be fetched.
pub async fn load_tokens<F>(source: &TokenSource, secrets: F) -> Result<TokenStore, ConfigError>
where
    F: FnOnce() -> SecretManagerClient,
{
    let payload = match source {
        TokenSource::Json(json) => json.clone(),
        TokenSource::SecretManager {
            project_id,
            secret_name,
            version,
        } => {
            tracing::info!(secret = %secret_name, version = %version, "loading MCP tokens from Secret Manager");
            secrets().access(project_id, secret_name, version).await?
        }
        TokenSource::None => return Err(ConfigError::NoTokens),
    };
    TokenStore::from_json(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn unused_secrets() -> SecretManagerClient {
        panic!("Secret Manager must not be contacted")
    }

    #[tokio::test]
    async fn json_source_needs_no_secret_manager() {
        let store = load_tokens(&TokenSource::Json(r#"{"a":"t1"}"#.into()), unused_secrets)
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn no_source_is_an_error() {
        let err = load_tokens(&TokenSource::None, unused_secrets).await.unwrap_err();
        assert!(matches!(err, ConfigError::NoTokens));
    }

    #[tokio::test]
    async fn secret_manager_source_is_fetched() {
        let server = MockServer::start().await;
        let payload = base64::engine::general_purpose::STANDARD.encode(r#"{"n8n":"tok"}"#);
        Mock::given(method("GET"))
            .and(path("/projects/acme/secrets/mcp-tokens/versions/latest:access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "payload": { "data": payload } })))
            .expect(1)
            .mount(&server)
            .await;

        let source = TokenSource::SecretManager {
            project_id: "acme".into(),
            secret_name: "mcp-tokens".into(),
            version: "latest".into(),
        };
        let store = load_tokens(&source, || {
            let creds = Arc::new(AccessTokenProvider::fixed(Client::new(), "ya29.test"));
            SecretManagerClient::with_base_url(Client::new(), creds, &server.uri())
        })
        .await
        .unwrap();
        assert_eq!(store.authenticate(Some("tok")).unwrap().0, "n8n");
    }
}
