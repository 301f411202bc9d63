use glob::{MatchOptions, Pattern};

use crate::error::ToolError;

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// `owner/repo` glob allowlist from `GITHUB_ALLOWED_REPOS`
/// (comma-separated, e.g. `myorg/*,me/repo1`). Empty means allow all.
#[derive(Debug, Clone, Default)]
pub struct RepoAllowlist {
    patterns: Vec<Pattern>,
}

impl RepoAllowlist {
    pub fn parse(value: Option<&str>) -> Result<Self, glob::PatternError> {
        let patterns = value
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Pattern::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_allowed(&self, owner: &str, repo: &str) -> bool {
        self.is_allowed_full_name(&format!("{owner}/{repo}"))
    }

    pub fn is_allowed_full_name(&self, full_name: &str) -> bool {
        self.patterns.is_empty()
            || self.patterns.iter().any(|p| p.matches_with(full_name, MATCH))
    }

    pub fn require(&self, owner: &str, repo: &str) -> Result<(), ToolError> {
        if self.is_allowed(owner, repo) {
            Ok(())
        } else {
            Err(ToolError::rejected(format!(
                "Repository '{owner}/{repo}' is not allowed by server policy. \
                 Ask an admin to add it to GITHUB_ALLOWED_REPOS."
            )))
        }
    }
}
