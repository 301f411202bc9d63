// ---------------------------------------------------------------------------
// github.rs - Minimal read-only GitHub REST client
// ---------------------------------------------------------------------------

use std::sync::OnceLock;

use futures_util::{stream, StreamExt};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::GitHubSettings;
use crate::error::ToolError;
use crate::guardrails::RepoAllowlist;

const SERVICE: &str = "github";
const API_VERSION: &str = "2022-11-28";
/// Commit messages are cut to their first line and at most this many chars.
const MESSAGE_MAX_CHARS: usize = 240;
/// Concurrent commit lookups when scanning an owner's repositories.
const SCAN_CONCURRENCY: usize = 4;

static OWNER_RE: OnceLock<Regex> = OnceLock::new();
static REPO_RE: OnceLock<Regex> = OnceLock::new();

/// Logins and org names: alphanumerics with inner hyphens or underscores
/// (Enterprise Managed Users carry an `_shortcode` suffix).
pub fn validate_owner(owner: &str) -> Result<(), ToolError> {
    let re = OWNER_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9_-]{0,98}[A-Za-z0-9])?$").unwrap());
    if re.is_match(owner) {
        Ok(())
    } else {
        Err(ToolError::invalid(format!("'{owner}' is not a valid GitHub owner name")))
    }
}

pub fn validate_repo(repo: &str) -> Result<(), ToolError> {
    let re = REPO_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]{1,100}$").unwrap());
    if re.is_match(repo) && repo != "." && repo != ".." {
        Ok(())
    } else {
        Err(ToolError::invalid(format!("'{repo}' is not a valid GitHub repository name")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubOwner {
    pub login: String,
    /// `User` or `Organization`.
    pub owner_type: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RepoSummary {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub private: Option<bool>,
    pub default_branch: Option<String>,
    pub pushed_at: Option<String>,
    pub updated_at: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommitSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub sha: Option<String>,
    pub message: String,
    pub date: Option<String>,
    pub author: Option<String>,
    pub committer: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct RepoCommit {
    repo: String,
    #[serde(flatten)]
    commit: CommitSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestAcrossRepos {
    pub scanned_repos: usize,
    pub latest: Value,
}

pub struct GitHubService {
    client: Client,
    base_url: Url,
}

impl GitHubService {
    pub fn new(client: Client, base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url.trim_end_matches('/'))?,
        })
    }

    /// Build the dedicated HTTP client (default headers + timeout) and service.
    pub fn from_settings(settings: &GitHubSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        headers.insert(USER_AGENT, HeaderValue::from_str(&settings.user_agent)?);
        if let Some(token) = &settings.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            tracing::warn!("GITHUB_TOKEN not set; GitHub calls are unauthenticated and tightly rate limited");
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self::new(client, &settings.api_base_url)?)
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    async fn get_json(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Value, ToolError> {
        let url = self.url(segments, query);
        tracing::debug!(path = %url.path(), "GitHub GET");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::transport(SERVICE, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| crate::gcp::truncate(&body, 300));
            return Err(ToolError::upstream(SERVICE, Some(status.as_u16()), message));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ToolError::transport(SERVICE, e))
    }

    pub async fn resolve_owner(&self, owner: &str) -> Result<GitHubOwner, ToolError> {
        let data = self.get_json(&["users", owner], &[]).await?;
        Ok(GitHubOwner {
            login: data["login"].as_str().unwrap_or(owner).to_string(),
            owner_type: data["type"]
                .as_str()
                .filter(|t| !t.is_empty())
                .unwrap_or("User")
                .to_string(),
        })
    }

    /// One page (100) of the owner's repositories, most recently pushed first.
    pub async fn list_repos(&self, owner: &str) -> Result<Vec<RepoSummary>, ToolError> {
        let resolved = self.resolve_owner(owner).await?;
        let kind = if resolved.owner_type == "Organization" { "orgs" } else { "users" };

        let data = self
            .get_json(
                &[kind, &resolved.login, "repos"],
                &[("per_page", "100"), ("page", "1"), ("sort", "pushed"), ("direction", "desc")],
            )
            .await?;

        let items = data
            .as_array()
            .ok_or_else(|| ToolError::upstream(SERVICE, None, "expected a JSON array of repositories"))?;

        Ok(items
            .iter()
            .map(|r| RepoSummary {
                name: str_field(r, "/name"),
                full_name: str_field(r, "/full_name"),
                private: r["private"].as_bool(),
                default_branch: str_field(r, "/default_branch"),
                pushed_at: str_field(r, "/pushed_at"),
                updated_at: str_field(r, "/updated_at"),
                html_url: str_field(r, "/html_url"),
            })
            .collect())
    }

    pub async fn default_branch(&self, owner: &str, repo: &str) -> Result<String, ToolError> {
        let data = self.get_json(&["repos", owner, repo], &[]).await?;
        Ok(data["default_branch"]
            .as_str()
            .filter(|b| !b.is_empty())
            .unwrap_or("main")
            .to_string())
    }

    /// Head commit of `branch` (the default branch when `None`).
    pub async fn latest_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: Option<&str>,
    ) -> Result<CommitSummary, ToolError> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self.default_branch(owner, repo).await?,
        };

        let head = self.get_json(&["repos", owner, repo, "commits", &branch], &[]).await?;
        if !head.is_object() {
            return Err(ToolError::upstream(SERVICE, None, format!("no commit found for '{branch}'")));
        }

        let mut summary = summarize_commit(&head);
        summary.branch = Some(branch);
        Ok(summary)
    }

    /// Up to `limit` (max 100) most recent commits on `branch`.
    pub async fn latest_commits(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
        branch: Option<&str>,
    ) -> Result<Vec<CommitSummary>, ToolError> {
        let branch = match branch {
            Some(b) => b.to_string(),
            None => self.default_branch(owner, repo).await?,
        };
        let per_page = limit.clamp(1, 100).to_string();

        let data = self
            .get_json(
                &["repos", owner, repo, "commits"],
                &[("sha", &branch), ("per_page", &per_page), ("page", "1")],
            )
            .await?;

        let items = data
            .as_array()
            .ok_or_else(|| ToolError::upstream(SERVICE, None, "expected a JSON array of commits"))?;

        Ok(items.iter().take(limit).map(summarize_commit).collect())
    }

    /// Scan up to `max_repos` of the owner's repositories (those the allowlist
    /// permits) and return the most recent commit found. Repositories that
    /// answer with an HTTP error (empty, no access) are skipped.
    pub async fn latest_commit_across_repos(
        &self,
        owner: &str,
        max_repos: usize,
        allowlist: &RepoAllowlist,
    ) -> Result<LatestAcrossRepos, ToolError> {
        let repos: Vec<RepoSummary> = self
            .list_repos(owner)
            .await?
            .into_iter()
            .filter(|r| r.full_name.as_deref().is_some_and(|n| allowlist.is_allowed_full_name(n)))
            .take(max_repos)
            .collect();
        let scanned_repos = repos.len();

        let targets: Vec<(String, Option<String>)> = repos
            .into_iter()
            .filter_map(|r| Some((r.full_name?, r.default_branch)))
            .filter(|(full_name, _)| full_name.contains('/'))
            .collect();

        let results: Vec<(String, Result<CommitSummary, ToolError>)> = stream::iter(targets)
            .map(|(full_name, branch)| async move {
                let (o, name) = full_name.split_once('/').unwrap_or_default();
                let res = self.latest_commit(o, name, branch.as_deref()).await;
                (full_name, res)
            })
            .buffered(SCAN_CONCURRENCY)
            .collect()
            .await;

        let mut best: Option<RepoCommit> = None;
        for (full_name, res) in results {
            let commit = match res {
                Ok(c) => c,
                Err(e) if e.upstream_status().is_some() => {
                    tracing::debug!(repo = %full_name, "skipping repo: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let newer = match &best {
                None => true,
                Some(b) => commit.date.is_some() && commit.date > b.commit.date,
            };
            if newer {
                best = Some(RepoCommit { repo: full_name, commit });
            }
        }

        let latest = match best {
            Some(b) => serde_json::to_value(b).unwrap_or(Value::Null),
            None => json!({ "error": "No commits found (or no accessible repos)." }),
        };
        Ok(LatestAcrossRepos { scanned_repos, latest })
    }
}

fn str_field(v: &Value, pointer: &str) -> Option<String> {
    v.pointer(pointer).and_then(|s| s.as_str()).map(str::to_string)
}

/// Shape one item of the commits API into a [`CommitSummary`].
/// Date prefers the committer date, falling back to the author date.
pub fn summarize_commit(item: &Value) -> CommitSummary {
    let message: String = item
        .pointer("/commit/message")
        .and_then(|m| m.as_str())
        .and_then(|m| m.lines().next())
        .unwrap_or_default()
        .chars()
        .take(MESSAGE_MAX_CHARS)
        .collect();

    CommitSummary {
        branch: None,
        sha: str_field(item, "/sha"),
        message,
        date: str_field(item, "/commit/committer/date").or_else(|| str_field(item, "/commit/author/date")),
        author: str_field(item, "/author/login"),
        committer: str_field(item, "/committer/login"),
        html_url: str_field(item, "/html_url"),
    }
}
