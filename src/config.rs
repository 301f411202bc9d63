// ---------------------------------------------------------------------------
// config.rs - Runtime configuration loaded from environment variables
// ---------------------------------------------------------------------------

use std::time::Duration;

use crate::error::ConfigError;

/// Which external API this deployment exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    GitHub,
    BigQuery,
}

impl ServiceKind {
    /// Name announced in `initialize` and on `/`.
    pub fn server_name(self) -> &'static str {
        match self {
            ServiceKind::GitHub => "github-mcp",
            ServiceKind::BigQuery => "bigquery-mcp",
        }
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(ServiceKind::GitHub),
            "bigquery" | "bq" => Ok(ServiceKind::BigQuery),
            other => Err(format!("expected 'github' or 'bigquery', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub api_base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub token: Option<String>,
    pub max_repos_scan: usize,
    pub max_commits_return: i64,
    pub allowed_repos: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BigQuerySettings {
    pub project_id: String,
    pub location: Option<String>,
    pub max_bytes_billed: i64,
    pub default_limit: i64,
    pub max_return_rows: i64,
    pub api_base_url: String,
    pub query_timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum ServiceSettings {
    GitHub(GitHubSettings),
    BigQuery(BigQuerySettings),
}

/// Where the client token allowlist comes from, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Json(String),
    SecretManager {
        project_id: String,
        secret_name: String,
        version: String,
    },
    None,
}

/// GCP access for Secret Manager and BigQuery.
#[derive(Debug, Clone)]
pub struct GcpSettings {
    /// Static OAuth access token (local development). When absent the
    /// metadata server of the managed platform is used.
    pub access_token: Option<String>,
    pub metadata_host: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: String,
    pub port: u16,
    pub log_level: String,
    pub service: ServiceSettings,
    pub tokens: TokenSource,
    pub allow_query_param_token: bool,
    pub max_sessions: usize,
    /// Seconds until one more request is allowed after the burst is spent.
    pub rate_limit_replenish_seconds: u64,
    pub rate_limit_burst: u32,
    pub gcp: GcpSettings,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let kind: ServiceKind = get("MCP_SERVICE")
            .ok_or(ConfigError::Missing("MCP_SERVICE"))?
            .parse()
            .map_err(|reason| ConfigError::Invalid { key: "MCP_SERVICE", reason })?;

        let service = match kind {
            ServiceKind::GitHub => ServiceSettings::GitHub(GitHubSettings {
                api_base_url: get("GITHUB_API_BASE_URL")
                    .unwrap_or_else(|| "https://api.github.com".to_string()),
                user_agent: get("GITHUB_USER_AGENT")
                    .unwrap_or_else(|| "mcp-github-server/0.1".to_string()),
                timeout: Duration::from_secs(parse_or(&get, "GITHUB_TIMEOUT_SECONDS", 15)?),
                token: get("GITHUB_TOKEN_SECRET_PAYLOAD").or_else(|| get("GITHUB_TOKEN")),
                max_repos_scan: parse_or(&get, "GITHUB_MAX_REPOS_SCAN", 25)?,
                max_commits_return: parse_or(&get, "GITHUB_MAX_COMMITS_RETURN", 20)?,
                allowed_repos: get("GITHUB_ALLOWED_REPOS"),
            }),
            ServiceKind::BigQuery => ServiceSettings::BigQuery(BigQuerySettings {
                project_id: get("BQ_PROJECT_ID").ok_or(ConfigError::Missing("BQ_PROJECT_ID"))?,
                location: get("BQ_LOCATION"),
                max_bytes_billed: parse_or(&get, "BQ_MAX_BYTES_BILLED", 5_000_000_000)?,
                default_limit: parse_or(&get, "BQ_DEFAULT_LIMIT", 500)?,
                max_return_rows: parse_or(&get, "BQ_MAX_RETURN_ROWS", 1000)?,
                api_base_url: get("BQ_API_BASE_URL")
                    .unwrap_or_else(|| "https://bigquery.googleapis.com/bigquery/v2".to_string()),
                query_timeout: Duration::from_secs(parse_or(&get, "BQ_QUERY_TIMEOUT_SECONDS", 120)?),
            }),
        };

        let tokens = if let Some(json) = get("MCP_TOKENS_JSON") {
            TokenSource::Json(json)
        } else if let Some(payload) = get("MCP_TOKENS_SECRET_PAYLOAD") {
            TokenSource::Json(payload)
        } else if let Some(secret_name) = get("MCP_TOKENS_SECRET_NAME") {
            let project_id = get("GCP_PROJECT_ID")
                .or_else(|| get("BQ_PROJECT_ID"))
                .ok_or(ConfigError::Missing("GCP_PROJECT_ID"))?;
            TokenSource::SecretManager {
                project_id,
                secret_name,
                version: get("MCP_TOKENS_SECRET_VERSION").unwrap_or_else(|| "latest".to_string()),
            }
        } else {
            TokenSource::None
        };

        Ok(Self {
            env: get("ENV").unwrap_or_else(|| "dev".to_string()),
            port: parse_or(&get, "PORT", 8080)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            service,
            tokens,
            allow_query_param_token: parse_bool(&get, "ALLOW_QUERY_PARAM_TOKEN")?,
            max_sessions: parse_or(&get, "MCP_MAX_SESSIONS", 100)?,
            rate_limit_replenish_seconds: parse_or(&get, "RATE_LIMIT_REPLENISH_SECONDS", 2)?,
            rate_limit_burst: parse_or(&get, "RATE_LIMIT_BURST", 30)?,
            gcp: GcpSettings {
                access_token: get("GOOGLE_OAUTH_ACCESS_TOKEN"),
                metadata_host: get("GCE_METADATA_HOST")
                    .unwrap_or_else(|| "metadata.google.internal".to_string()),
            },
        })
    }

    pub fn kind(&self) -> ServiceKind {
        match self.service {
            ServiceSettings::GitHub(_) => ServiceKind::GitHub,
            ServiceSettings::BigQuery(_) => ServiceKind::BigQuery,
        }
    }

    pub fn is_prod(&self) -> bool {
        matches!(self.env.to_ascii_lowercase().as_str(), "prod" | "production")
    }

    /// Swagger UI and the OpenAPI document are served outside production only.
    pub fn docs_enabled(&self) -> bool {
        !self.is_prod()
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("'{raw}': {e}"),
        }),
    }
}

fn parse_bool<G>(get: &G, key: &'static str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                reason: format!("'{v}' is not a boolean"),
            }),
        },
    }
}
