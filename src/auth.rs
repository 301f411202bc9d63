// Bearer token authentication against a static allowlist.
// Every route except health (and docs outside production) requires
// `Authorization: Bearer <token>` matching one configured client token.


use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::error::ConfigError;
use crate::handlers::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Bearer token")]
    Missing,
    #[error("Invalid token")]
    Invalid,
}

/// Label of the authenticated client, attached to the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLabel(pub String);

impl std::fmt::Display for ClientLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable allowlist of client tokens, keyed by client label.
#[derive(Clone)]
pub struct TokenStore {
    entries: Vec<(String, String)>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("labels", &self.labels().collect::<Vec<_>>())
            .finish()
    }
}

impl TokenStore {
    /// Build from `(label, token)` pairs in document order. A token listed
    /// under several labels authenticates as the last of them. Empty
    /// mappings are rejected.
    pub fn new(label_to_token: Vec<(String, String)>) -> Result<Self, ConfigError> {
        let mut entries: Vec<(String, String)> = Vec::with_capacity(label_to_token.len());
        for (label, token) in label_to_token {
            if let Some(entry) = entries.iter_mut().find(|(_, t)| *t == token) {
                tracing::warn!(label = %label, replaced = %entry.0, "duplicate MCP token, later label wins");
                entry.0 = label;
                continue;
            }
            entries.push((label, token));
        }
        if entries.is_empty() {
            return Err(ConfigError::NoTokens);
        }
        Ok(Self { entries })
    }

    /// Parse the JSON payload of `MCP_TOKENS_JSON` / the token secret.
    pub fn from_json(payload: &str) -> Result<Self, ConfigError> {
        Self::new(parse_tokens_json(payload)?)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accept iff `token` equals one configured token. Every entry is compared
    /// in constant time so the match position does not leak through timing.
    pub fn authenticate(&self, token: Option<&str>) -> Result<ClientLabel, AuthError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::Missing)?;
        let mut found: Option<&str> = None;
        for (label, known) in &self.entries {
            if bool::from(known.as_bytes().ct_eq(token.as_bytes())) && found.is_none() {
                found = Some(label);
            }
        }
        found
            .map(|label| ClientLabel(label.to_string()))
            .ok_or(AuthError::Invalid)
    }
}

/// Parse `{label: token}` keeping document order; non-string entries are
/// skipped, both sides trimmed, empty labels or tokens dropped. Labels that
/// collide after trimming keep the later token.
pub fn parse_tokens_json(payload: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let data: Value =
        serde_json::from_str(payload).map_err(|e| ConfigError::TokensJson(e.to_string()))?;
    let Value::Object(map) = data else {
        return Err(ConfigError::TokensJson(
            "MCP tokens must be a JSON object mapping {label: token}".to_string(),
        ));
    };

    let mut cleaned: Vec<(String, String)> = Vec::with_capacity(map.len());
    for (label, token) in &map {
        let Some(token) = token.as_str().map(str::trim) else {
            continue;
        };
        let label = label.trim();
        if label.is_empty() || token.is_empty() {
            continue;
        }
        match cleaned.iter_mut().find(|(l, _)| l == label) {
            Some(entry) => entry.1 = token.to_string(),
            None => cleaned.push((label.to_string(), token.to_string())),
        }
    }
    Ok(cleaned)
}

/// Pull the bearer token from the `Authorization` header, or from the
/// `access_token` query parameter when `allow_query_param` is set.
pub fn extract_bearer_token(
    headers: &HeaderMap,
    query: Option<&str>,
    allow_query_param: bool,
) -> Option<String> {
    let from_header = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|value| {
            let mut parts = value.trim().splitn(2, char::is_whitespace);
            let scheme = parts.next()?;
            let token = parts.next()?.trim();
            (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
        });
    if from_header.is_some() || !allow_query_param {
        return from_header;
    }

    query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "access_token")
            .map(|(_, value)| value.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Middleware that rejects requests without a valid client token.
/// Health routes must NOT use this middleware.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_bearer_token(
        request.headers(),
        request.uri().query(),
        state.allow_query_param_token,
    );

    match state.tokens.authenticate(token.as_deref()) {
        Ok(label) => {
            tracing::debug!(client = %label, path = %request.uri().path(), "authenticated");
            request.extensions_mut().insert(label);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(path = %request.uri().path(), "auth failed: {}", e);
            ApiError::Unauthorized(e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn store() -> TokenStore {
        TokenStore::from_json(r#"{"copilot-test":"tok-a","n8n-prod":"tok-b"}"#).unwrap()
    }

    fn headers(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(http::header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn known_tokens_are_accepted_with_their_label() {
        let s = store();
        assert_eq!(s.authenticate(Some("tok-a")).unwrap().0, "copilot-test");
        assert_eq!(s.authenticate(Some("tok-b")).unwrap().0, "n8n-prod");
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        let s = store();
        for candidate in ["tok-c", "tok-a ", "TOK-A", "tok", "tok-ab", "copilot-test"] {
            assert_eq!(s.authenticate(Some(candidate)), Err(AuthError::Invalid), "{candidate}");
        }
    }

    #[test]
    fn missing_or_empty_token_is_missing() {
        let s = store();
        assert_eq!(s.authenticate(None), Err(AuthError::Missing));
        assert_eq!(s.authenticate(Some("")), Err(AuthError::Missing));
    }

    #[test]
    fn parse_skips_non_strings_and_blank_entries() {
        let pairs = parse_tokens_json(r#"{" a ":" x ","b":5,"c":"","":"y","d":null}"#).unwrap();
        assert_eq!(pairs, vec![("a".to_string(), "x".to_string())]);
    }

    #[test]
    fn parse_keeps_document_order() {
        let pairs = parse_tokens_json(r#"{"zeta":"1","alpha":"2"," zeta ":"3"}"#).unwrap();
        assert_eq!(
            pairs,
            vec![("zeta".to_string(), "3".to_string()), ("alpha".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn parse_rejects_non_object_and_bad_json() {
        assert!(matches!(parse_tokens_json("[1,2]"), Err(ConfigError::TokensJson(_))));
        assert!(matches!(parse_tokens_json("{not json"), Err(ConfigError::TokensJson(_))));
    }

    #[test]
    fn empty_allowlist_is_a_config_error() {
        assert!(matches!(TokenStore::from_json("{}"), Err(ConfigError::NoTokens)));
        assert!(matches!(TokenStore::from_json(r#"{"a":"  "}"#), Err(ConfigError::NoTokens)));
    }

    #[test]
    fn duplicate_tokens_authenticate_as_the_last_label() {
        let s = TokenStore::from_json(r#"{"zeta":"same","alpha":"same","other":"x"}"#).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.authenticate(Some("same")).unwrap().0, "alpha");

        let s = TokenStore::from_json(r#"{"alpha":"same","zeta":"same"}"#).unwrap();
        assert_eq!(s.authenticate(Some("same")).unwrap().0, "zeta");
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", store());
        assert!(rendered.contains("copilot-test"));
        assert!(!rendered.contains("tok-a"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(extract_bearer_token(&headers("Bearer abc"), None, false).as_deref(), Some("abc"));
        assert_eq!(extract_bearer_token(&headers("bearer abc"), None, false).as_deref(), Some("abc"));
        assert_eq!(extract_bearer_token(&headers("BEARER   abc  "), None, false).as_deref(), Some("abc"));
    }

    #[test]
    fn non_bearer_schemes_are_ignored() {
        assert_eq!(extract_bearer_token(&headers("Basic abc"), None, false), None);
        assert_eq!(extract_bearer_token(&headers("Bearer"), None, false), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new(), None, false), None);
    }

    #[test]
    fn query_param_only_when_enabled() {
        let empty = HeaderMap::new();
        assert_eq!(extract_bearer_token(&empty, Some("access_token=qp"), false), None);
        assert_eq!(
            extract_bearer_token(&empty, Some("session_id=1&access_token=qp"), true).as_deref(),
            Some("qp")
        );
        // Header wins over the query parameter.
        assert_eq!(
            extract_bearer_token(&headers("Bearer hdr"), Some("access_token=qp"), true).as_deref(),
            Some("hdr")
        );
    }
}
