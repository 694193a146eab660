// The commit batch carried by one push.
//
// Commits arrive newest first, the way the git transport lists them. The
// batch keeps that order for storage and payloads; anything that needs
// real commit order (issue close/reopen) must go through `oldest_first`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::avatar;
use crate::config::Settings;
use crate::db::Database;

/// Upper bound on commits scanned for issue references in one push.
pub const MAX_SCANNED_COMMITS: usize = 100;

/// One pushed commit, as reported by the git hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushCommit {
    pub sha1: String,
    pub message: String,
    pub author_email: String,
    pub author_name: String,
}

/// What a commit author's email resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    /// Login name of the matching account, if any.
    pub user_name: Option<String>,
    pub avatar_url: String,
}

/// All commits of one push plus the compare link.
///
/// Serialized as the `content` of commit-push feed entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushCommits {
    /// Number of commits in the push before any truncation.
    pub len: usize,
    /// Newest first.
    pub commits: Vec<PushCommit>,
    /// Site-relative compare view, empty for a new branch or a tag.
    #[serde(default)]
    pub compare_url: String,
    #[serde(skip)]
    authors: HashMap<String, CommitAuthor>,
}

impl PushCommits {
    /// Wrap a newest-first commit list.
    pub fn new(commits: Vec<PushCommit>) -> Self {
        Self {
            len: commits.len(),
            commits,
            compare_url: String::new(),
            authors: HashMap::new(),
        }
    }

    /// The batch recorded for tag pushes: no commits, no compare link.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Commits in the order they were made.
    pub fn oldest_first(&self) -> impl Iterator<Item = &PushCommit> {
        self.commits.iter().rev()
    }

    /// Drop everything but the `n` most recent commits.
    pub fn keep_newest(&mut self, n: usize) {
        self.commits.truncate(n);
    }

    /// Resolve a commit author's email, at most once per batch.
    ///
    /// Unknown emails fall back to a hashed avatar. Lookup errors are
    /// logged and treated like unknown emails.
    pub async fn resolve_author(
        &mut self,
        db: &dyn Database,
        settings: &Settings,
        email: &str,
    ) -> &CommitAuthor {
        if !self.authors.contains_key(email) {
            let author = match db.get_user_by_email(email).await {
                Ok(Some(user)) => CommitAuthor {
                    user_name: Some(user.name.clone()),
                    avatar_url: user.avatar_link(settings),
                },
                Ok(None) => CommitAuthor {
                    user_name: None,
                    avatar_url: avatar::hashed_link(&settings.avatar_source, email),
                },
                Err(e) => {
                    error!(email, error = %e, "Failed to look up commit author");
                    CommitAuthor {
                        user_name: None,
                        avatar_url: avatar::hashed_link(&settings.avatar_source, email),
                    }
                }
            };
            self.authors.insert(email.to_string(), author);
        }
        &self.authors[email]
    }

    /// Avatar for a commit author, resolving on first use.
    pub async fn avatar_link(
        &mut self,
        db: &dyn Database,
        settings: &Settings,
        email: &str,
    ) -> String {
        self.resolve_author(db, settings, email).await.avatar_url.clone()
    }

    /// Resolve every distinct author email of the retained commits.
    pub async fn resolve_authors(&mut self, db: &dyn Database, settings: &Settings) {
        let emails: Vec<String> = self.commits.iter().map(|c| c.author_email.clone()).collect();
        for email in emails {
            self.resolve_author(db, settings, &email).await;
        }
    }

    /// A previously resolved author, if any.
    pub fn author(&self, email: &str) -> Option<&CommitAuthor> {
        self.authors.get(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, NewUser};

    fn commit(sha: &str, message: &str) -> PushCommit {
        PushCommit {
            sha1: sha.to_string(),
            message: message.to_string(),
            author_email: format!("{sha}@example.com"),
            author_name: sha.to_string(),
        }
    }

    #[test]
    fn test_oldest_first_reverses_transport_order() {
        let batch = PushCommits::new(vec![commit("c3", "newest"), commit("c2", ""), commit("c1", "oldest")]);
        let order: Vec<&str> = batch.oldest_first().map(|c| c.sha1.as_str()).collect();
        assert_eq!(order, vec!["c1", "c2", "c3"]);
        // storage order is untouched
        assert_eq!(batch.commits[0].sha1, "c3");
    }

    #[test]
    fn test_keep_newest_preserves_len() {
        let mut batch = PushCommits::new((0..10).map(|i| commit(&format!("c{i}"), "")).collect());
        batch.keep_newest(3);
        assert_eq!(batch.len, 10);
        assert_eq!(batch.commits.len(), 3);
        assert_eq!(batch.commits[0].sha1, "c0");
    }

    #[test]
    fn test_serialized_shape_skips_author_cache() {
        let mut batch = PushCommits::new(vec![commit("abc", "msg")]);
        batch.compare_url = "o/r/compare/a...b".to_string();
        let json: serde_json::Value = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["len"], 1);
        assert_eq!(json["commits"][0]["sha1"], "abc");
        assert_eq!(json["compare_url"], "o/r/compare/a...b");
        assert!(json.get("authors").is_none());
    }

    #[tokio::test]
    async fn test_author_resolved_once_per_batch() {
        let db = open_in_memory().unwrap();
        let settings = Settings::default();
        let mut batch = PushCommits::new(vec![commit("abc", "msg")]);

        let first = batch.avatar_link(&db, &settings, "late@example.com").await;
        assert!(batch.author("late@example.com").unwrap().user_name.is_none());

        // An account created after the first lookup is not seen by this batch.
        db.create_user(&NewUser::new("late", "late@example.com")).await.unwrap();
        let second = batch.avatar_link(&db, &settings, "late@example.com").await;
        assert_eq!(first, second);
        assert!(batch.author("late@example.com").unwrap().user_name.is_none());

        // A fresh batch does see it.
        let mut fresh = PushCommits::new(vec![]);
        let author = fresh.resolve_author(&db, &settings, "late@example.com").await;
        assert_eq!(author.user_name.as_deref(), Some("late"));
    }
}
