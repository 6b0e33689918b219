//! GitHub commit references
//!
//! NVD references point at commits in many spellings: trailing `.patch`,
//! fragments such as `#diff-...`, query strings, `CONFIRM:` suffixes, doubled
//! slashes. They are reduced to `https://github.com/{owner}/{repo}/commit/{sha}`
//! so the same commit always gets the same id.

use regex::Regex;

use crate::error::Result;

/// A normalized commit reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubCommit {
    pub owner: String,
    pub repo: String,
    pub sha: String,
}

impl GithubCommit {
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}/commit/{}", self.owner, self.repo, self.sha)
    }
}

/// Recognizes GitHub commit URLs
#[derive(Debug, Clone)]
pub struct CommitMatcher {
    pattern: Regex,
}

impl CommitMatcher {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(
            r"^(?:https?|git)://(?:www\.)?github\.com/(?P<owner>[\w.-]+)/(?P<repo>[\w.-]+?)(?:\.git)?/commits?/(?P<sha>[0-9a-fA-F]{7,40})(?:\.(?:patch|diff))?/?$",
        )?;
        Ok(Self { pattern })
    }

    /// Parse a reference URL, returning `None` for anything that is not a
    /// single GitHub commit.
    pub fn parse(&self, url: &str) -> Option<GithubCommit> {
        let cleaned = url
            .trim()
            .trim_end_matches("CONFIRM:")
            .replace("//commit/", "/commit/")
            .replace("%23", "#");
        let cleaned = cleaned
            .split(['#', '?'])
            .next()
            .unwrap_or_default()
            .trim_end_matches([',', ')']);

        let captures = self.pattern.captures(cleaned)?;
        Some(GithubCommit {
            owner: captures["owner"].to_string(),
            repo: captures["repo"].to_string(),
            sha: captures["sha"].to_lowercase(),
        })
    }
}
