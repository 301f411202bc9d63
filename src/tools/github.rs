//! GitHub repository and commit tools.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{optional, parse_args, required, tool_def};
use crate::config::GitHubSettings;
use crate::error::ToolError;
use crate::github::{validate_owner, validate_repo, GitHubService};
use crate::guardrails::{clamp_int, RepoAllowlist};

pub const LIST_REPOS: &str = "github_list_repos";
pub const LATEST_COMMIT: &str = "github_latest_commit";
pub const LATEST_COMMITS: &str = "github_latest_commits";
pub const LATEST_COMMIT_ACROSS_REPOS: &str = "github_latest_commit_across_repos";

const DEFAULT_COMMITS: i64 = 5;

pub struct GitHubTools {
    service: GitHubService,
    allowlist: RepoAllowlist,
    max_repos_scan: usize,
    max_commits_return: i64,
}

#[derive(Debug, Deserialize)]
struct OwnerArgs {
    owner: String,
}

#[derive(Debug, Deserialize)]
struct CommitArgs {
    owner: String,
    repo: String,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitsArgs {
    owner: String,
    repo: String,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AcrossArgs {
    owner: String,
    #[serde(default)]
    max_repos: Option<i64>,
}

impl GitHubTools {
    pub fn new(service: GitHubService, settings: &GitHubSettings) -> anyhow::Result<Self> {
        let allowlist = RepoAllowlist::parse(settings.allowed_repos.as_deref())?;
        if allowlist.is_empty() {
            tracing::info!("GITHUB_ALLOWED_REPOS not set; all repositories visible to the token are allowed");
        }
        Ok(Self {
            service,
            allowlist,
            max_repos_scan: settings.max_repos_scan.max(1),
            max_commits_return: settings.max_commits_return.max(1),
        })
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        match name {
            LIST_REPOS => self.list_repos(parse_args(arguments)?).await,
            LATEST_COMMIT => self.latest_commit(parse_args(arguments)?).await,
            LATEST_COMMITS => self.latest_commits(parse_args(arguments)?).await,
            LATEST_COMMIT_ACROSS_REPOS => self.latest_commit_across_repos(parse_args(arguments)?).await,
            other => Err(ToolError::invalid(format!("Unknown tool: {other}"))),
        }
    }

    async fn list_repos(&self, args: OwnerArgs) -> Result<Value, ToolError> {
        let owner = owner(&args.owner)?;
        let repos: Vec<_> = self
            .service
            .list_repos(&owner)
            .await?
            .into_iter()
            .filter(|r| r.full_name.as_deref().is_some_and(|n| self.allowlist.is_allowed_full_name(n)))
            .collect();

        Ok(json!({
            "ok": true,
            "owner": owner,
            "repo_count": repos.len(),
            "repos": repos,
        }))
    }

    async fn latest_commit(&self, args: CommitArgs) -> Result<Value, ToolError> {
        let (owner, repo) = owner_repo(&args.owner, &args.repo)?;
        self.allowlist.require(&owner, &repo)?;

        let commit = self
            .service
            .latest_commit(&owner, &repo, optional(args.branch).as_deref())
            .await?;
        Ok(json!({
            "ok": true,
            "owner": owner,
            "repo": repo,
            "branch": commit.branch,
            "commit": commit,
        }))
    }

    async fn latest_commits(&self, args: CommitsArgs) -> Result<Value, ToolError> {
        let (owner, repo) = owner_repo(&args.owner, &args.repo)?;
        self.allowlist.require(&owner, &repo)?;

        let limit = clamp_int(args.limit, DEFAULT_COMMITS, 1, self.max_commits_return);
        let commits = self
            .service
            .latest_commits(&owner, &repo, limit as usize, optional(args.branch).as_deref())
            .await?;
        Ok(json!({
            "ok": true,
            "owner": owner,
            "repo": repo,
            "limit": limit,
            "commits": commits,
        }))
    }

    async fn latest_commit_across_repos(&self, args: AcrossArgs) -> Result<Value, ToolError> {
        let owner = owner(&args.owner)?;
        let cap = self.max_repos_scan as i64;
        let max_repos = clamp_int(args.max_repos, cap, 1, cap) as usize;

        let found = self
            .service
            .latest_commit_across_repos(&owner, max_repos, &self.allowlist)
            .await?;
        Ok(json!({
            "ok": true,
            "owner": owner,
            "scanned_repos": found.scanned_repos,
            "latest": found.latest,
        }))
    }
}

fn owner(raw: &str) -> Result<String, ToolError> {
    let owner = required("owner", raw)?;
    validate_owner(&owner)?;
    Ok(owner)
}

fn owner_repo(raw_owner: &str, raw_repo: &str) -> Result<(String, String), ToolError> {
    if raw_owner.trim().is_empty() || raw_repo.trim().is_empty() {
        return Err(ToolError::invalid("owner and repo are required"));
    }
    let owner = owner(raw_owner)?;
    let repo = raw_repo.trim().to_string();
    validate_repo(&repo)?;
    Ok((owner, repo))
}

pub fn definitions() -> Vec<Value> {
    let owner = json!({ "type": "string", "description": "GitHub user or organization login" });
    let repo = json!({ "type": "string", "description": "Repository name (without the owner)" });
    let branch = json!({ "type": "string", "description": "Branch name; defaults to the repository's default branch" });

    vec![
        tool_def(
            LIST_REPOS,
            "List repositories for a GitHub user or organization (auto-detected). Returns lightweight repo metadata.",
            json!({
                "type": "object",
                "properties": { "owner": owner },
                "required": ["owner"]
            }),
        ),
        tool_def(
            LATEST_COMMIT,
            "Get the latest commit of a repository (default branch if branch is not provided).",
            json!({
                "type": "object",
                "properties": { "owner": owner, "repo": repo, "branch": branch },
                "required": ["owner", "repo"]
            }),
        ),
        tool_def(
            LATEST_COMMITS,
            "Get the latest commits of a repository (default branch if branch is not provided).",
            json!({
                "type": "object",
                "properties": {
                    "owner": owner,
                    "repo": repo,
                    "limit": { "type": "integer", "description": "Number of commits (default 5, server-capped)", "minimum": 1 },
                    "branch": branch
                },
                "required": ["owner", "repo"]
            }),
        ),
        tool_def(
            LATEST_COMMIT_ACROSS_REPOS,
            "Scan an owner's most recently pushed repositories and return the most recent commit found.",
            json!({
                "type": "object",
                "properties": {
                    "owner": owner,
                    "max_repos": { "type": "integer", "description": "Repositories to scan (server-capped)", "minimum": 1 }
                },
                "required": ["owner"]
            }),
        ),
    ]
}
