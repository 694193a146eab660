// Commit-to-issue status updates.
//
// Walks a push's commits oldest first. For each commit:
//   1. every referenced issue (any repository) gets one commit-ref comment
//   2. close keywords close open issues of the pushed repository
//   3. reopen keywords reopen closed issues of the pushed repository
// Passes 2 and 3 share one "already handled" set per commit, so a commit
// can never both close and reopen the same issue; the close pass wins.

use std::collections::HashSet;

use anyhow::Result;
use tracing::debug;

use super::keywords::{KeywordKind, KeywordPatterns};
use super::reference;
use crate::activity::commits::{PushCommit, PushCommits};
use crate::config::Settings;
use crate::db::models::{Repository, User};
use crate::db::Database;

/// Issue ids touched by one run, in the order they were touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueUpdateSummary {
    /// Issues that received a new commit-ref comment.
    pub referenced: Vec<i64>,
    pub closed: Vec<i64>,
    pub reopened: Vec<i64>,
}

impl IssueUpdateSummary {
    pub fn is_empty(&self) -> bool {
        self.referenced.is_empty() && self.closed.is_empty() && self.reopened.is_empty()
    }
}

/// Applies commit message keywords to issues on behalf of the pusher.
pub struct IssueUpdater<'a> {
    db: &'a dyn Database,
    patterns: &'a KeywordPatterns,
    settings: &'a Settings,
}

impl<'a> IssueUpdater<'a> {
    pub fn new(db: &'a dyn Database, patterns: &'a KeywordPatterns, settings: &'a Settings) -> Self {
        Self {
            db,
            patterns,
            settings,
        }
    }

    /// Process a batch. Store errors stop the run and are returned; issues
    /// handled before the error keep their changes.
    pub async fn update_issues(
        &self,
        doer: &User,
        repo: &Repository,
        commits: &PushCommits,
    ) -> Result<IssueUpdateSummary> {
        let mut summary = IssueUpdateSummary::default();
        for commit in commits.oldest_first() {
            self.reference_pass(doer, repo, commit, &mut summary).await?;

            let mut marked = HashSet::new();
            self.status_pass(doer, repo, commit, true, &mut marked, &mut summary)
                .await?;
            self.status_pass(doer, repo, commit, false, &mut marked, &mut summary)
                .await?;
        }
        Ok(summary)
    }

    async fn reference_pass(
        &self,
        doer: &User,
        repo: &Repository,
        commit: &PushCommit,
        summary: &mut IssueUpdateSummary,
    ) -> Result<()> {
        let mut marked = HashSet::new();
        for token in self.patterns.find(KeywordKind::Reference, &commit.message) {
            let Some(issue) =
                reference::resolve(self.db, &token, &repo.owner_name, &repo.name).await?
            else {
                continue;
            };
            if !marked.insert(issue.id) {
                continue;
            }

            let content = ref_comment_html(self.settings, repo, commit);
            if self
                .db
                .create_ref_comment(doer, &issue, &content, &commit.sha1)
                .await?
            {
                summary.referenced.push(issue.id);
            } else {
                debug!(issue = issue.id, sha = %commit.sha1, "Commit already referenced");
            }
        }
        Ok(())
    }

    async fn status_pass(
        &self,
        doer: &User,
        repo: &Repository,
        commit: &PushCommit,
        close: bool,
        marked: &mut HashSet<i64>,
        summary: &mut IssueUpdateSummary,
    ) -> Result<()> {
        let kind = if close {
            KeywordKind::Close
        } else {
            KeywordKind::Reopen
        };
        for token in self.patterns.find(kind, &commit.message) {
            let Some(issue) =
                reference::resolve(self.db, &token, &repo.owner_name, &repo.name).await?
            else {
                continue;
            };
            if !marked.insert(issue.id) {
                continue;
            }
            // Closing or reopening another repository's issue is not allowed.
            if issue.repo_id != repo.id || issue.is_closed == close {
                continue;
            }

            if self
                .db
                .change_issue_status(doer, &issue, close, &commit.sha1)
                .await?
            {
                if close {
                    summary.closed.push(issue.id);
                } else {
                    summary.reopened.push(issue.id);
                }
            }
        }
        Ok(())
    }
}

/// `<a href="/owner/repo/commit/sha">message</a>`
fn ref_comment_html(settings: &Settings, repo: &Repository, commit: &PushCommit) -> String {
    let url = format!(
        "{}/{}/{}/commit/{}",
        settings.app_sub_url, repo.owner_name, repo.name, commit.sha1
    );
    format!(r#"<a href="{}">{}</a>"#, escape_html(&url), escape_html(&commit.message))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
