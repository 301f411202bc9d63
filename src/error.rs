//! Error types shared by the configuration loader, the upstream clients and
//! the MCP tools.
//!
//! Transport-level HTTP errors live in [`crate::handlers::ApiError`]; the
//! types here never reach the client as an HTTP status. Tool failures are
//! reported inside a successful JSON-RPC response with `isError: true`.

/// Start-up configuration problem. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to parse MCP tokens JSON: {0}")]
    TokensJson(String),

    #[error("no MCP tokens configured; provide MCP_TOKENS_JSON, MCP_TOKENS_SECRET_PAYLOAD or MCP_TOKENS_SECRET_NAME")]
    NoTokens,

    #[error("failed to load secret: {0}")]
    Secret(#[from] ToolError),
}

/// Failure of a single read-only operation.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The caller supplied a missing or malformed parameter.
    #[error("{0}")]
    InvalidArgument(String),

    /// A static server-side policy refused the request before it was forwarded.
    #[error("{0}")]
    PolicyRejected(String),

    /// The external API (or the transport to it) failed.
    #[error("{service} error{}: {message}", http_suffix(.status))]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ToolError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::PolicyRejected(msg.into())
    }

    pub fn upstream(service: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            status,
            message: message.into(),
        }
    }

    /// Wrap a transport failure (connect error, timeout, body decode).
    pub fn transport(service: &'static str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        Self::Upstream {
            service,
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// HTTP status reported by the upstream API, if any.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}
