//! Service identity access tokens.
//!
//! On the managed platform the workload's service account token comes from
//! the metadata server and is cached until shortly before it expires. For
//! local development a static token (`gcloud auth print-access-token`) can be
//! supplied instead.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::ToolError;

/// Tokens are refreshed this long before the metadata server says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug)]
enum Source {
    Static(String),
    Metadata {
        url: String,
        cache: RwLock<Option<CachedToken>>,
    },
}

#[derive(Debug)]
pub struct AccessTokenProvider {
    client: Client,
    source: Source,
}

impl AccessTokenProvider {
    pub fn fixed(client: Client, token: impl Into<String>) -> Self {
        Self {
            client,
            source: Source::Static(token.into()),
        }
    }

    /// `host` is a bare host (`metadata.google.internal`) or a full base URL.
    pub fn metadata(client: Client, host: &str) -> Self {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Self {
            client,
            source: Source::Metadata {
                url: format!("{base}/computeMetadata/v1/instance/service-accounts/default/token"),
                cache: RwLock::new(None),
            },
        }
    }

    /// Static token when configured, metadata server otherwise.
    pub fn from_settings(client: Client, gcp: &crate::config::GcpSettings) -> Self {
        match &gcp.access_token {
            Some(token) => Self::fixed(client, token.clone()),
            None => Self::metadata(client, &gcp.metadata_host),
        }
    }

    pub async fn token(&self) -> Result<String, ToolError> {
        match &self.source {
            Source::Static(token) => Ok(token.clone()),
            Source::Metadata { url, cache } => {
                if let Some(cached) = cache.read().await.as_ref() {
                    if Instant::now() < cached.refresh_at {
                        return Ok(cached.value.clone());
                    }
                }

                let mut guard = cache.write().await;
                // Another task may have refreshed while we waited for the lock.
                if let Some(cached) = guard.as_ref() {
                    if Instant::now() < cached.refresh_at {
                        return Ok(cached.value.clone());
                    }
                }

                let fresh = self.fetch(url).await?;
                let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
                *guard = Some(CachedToken {
                    value: fresh.access_token.clone(),
                    refresh_at: Instant::now() + lifetime,
                });
                tracing::debug!(expires_in = fresh.expires_in, "metadata access token refreshed");
                Ok(fresh.access_token)
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<MetadataToken, ToolError> {
        let resp = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| ToolError::transport("metadata", e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::upstream("metadata", Some(status), super::truncate(&body, 200)));
        }

        resp.json::<MetadataToken>()
            .await
            .map_err(|e| ToolError::transport("metadata", e))
    }
}
