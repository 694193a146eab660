// Issue reference resolution.
//
// A candidate token from the matcher becomes a canonical `owner/repo#index`
// string, which the store resolves to an issue. Bare `#index` tokens are
// qualified with the pushed repository. `user#index` is recognized but not
// supported and resolves to nothing.

use std::fmt;

use anyhow::{Context, Result};
use tracing::debug;

use crate::db::models::Issue;
use crate::db::Database;

/// A parsed `owner/repo#index` pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub index: i64,
}

impl IssueRef {
    /// Parse a canonical reference. Anything else yields None.
    pub fn parse(canonical: &str) -> Option<Self> {
        let (path, index) = canonical.split_once('#')?;
        let (owner, repo) = path.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        let index: i64 = index.parse().ok()?;
        if index <= 0 {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            index,
        })
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.index)
    }
}

/// Qualify a candidate token against the pushed repository.
///
/// Returns None for the unsupported `user#index` form.
pub fn canonicalize(token: &str, owner_name: &str, repo_name: &str) -> Option<String> {
    if token.starts_with('#') {
        Some(format!("{owner_name}/{repo_name}{token}"))
    } else if !token.contains('/') {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve a candidate token to an issue.
///
/// `Ok(None)` covers everything that simply does not point at an issue;
/// errors are store failures only.
pub async fn resolve(
    db: &dyn Database,
    token: &str,
    owner_name: &str,
    repo_name: &str,
) -> Result<Option<Issue>> {
    let Some(canonical) = canonicalize(token, owner_name, repo_name) else {
        debug!(token, "Skipping user-qualified issue reference");
        return Ok(None);
    };
    db.get_issue_by_ref(&canonical)
        .await
        .with_context(|| format!("Failed to resolve issue reference {canonical}"))
}
