//! Google Cloud plumbing shared by the BigQuery client and the token loader.
//!
//! Only two REST surfaces are needed: the metadata server (service identity
//! access tokens on the managed platform) and Secret Manager
//! `versions:access`. Both are plain JSON over HTTPS, so they go through the
//! same `reqwest` client as everything else.

pub mod credentials;
pub mod secret_manager;

pub use credentials::AccessTokenProvider;
pub use secret_manager::SecretManagerClient;

use serde_json::Value;

use crate::error::ToolError;

/// Turn a non-2xx Google API response into a [`ToolError::Upstream`], using
/// the `{"error": {"message": ...}}` envelope when present.
pub(crate) async fn google_error(service: &'static str, resp: reqwest::Response) -> ToolError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| truncate(&body, 300));
    ToolError::upstream(service, Some(status), message)
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello...");
        assert_eq!(truncate("żółw żółw", 4), "żółw...");
    }
}
