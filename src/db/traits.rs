// Database trait — async interface for everything the pipeline stores.
//
// Implementor: SqliteDatabase (wraps rusqlite). Methods are async so the
// pipeline stays backend-agnostic and the sync connection sits behind a
// mutex without leaking into callers.
//
// Lookups that can legitimately miss return Ok(None); Err is reserved for
// store failures.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{Comment, HookTask, Issue, NewIssue, NewRepository, NewUser, Repository, User};
use crate::activity::action::Action;
use crate::activity::feed::FeedQuery;

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Users ---

    async fn create_user(&self, new: &NewUser) -> Result<User>;

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Case-insensitive lookup by login name.
    async fn get_user_by_name(&self, name: &str) -> Result<Option<User>>;

    /// Case-insensitive lookup by email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    // --- Repositories ---

    /// Create a repository owned by `owner`, watched by the owner, and record
    /// the create-repo activity for `actor`.
    async fn create_repository(
        &self,
        actor: &User,
        owner: &User,
        new: &NewRepository,
    ) -> Result<Repository>;

    async fn get_repository_by_id(&self, id: i64) -> Result<Option<Repository>>;

    async fn get_repository_by_name(&self, owner_id: i64, name: &str) -> Result<Option<Repository>>;

    /// Persist metadata and bump the last-updated time.
    async fn update_repository(&self, repo: &Repository, visibility_changed: bool) -> Result<()>;

    // --- Watches ---

    async fn watch_repo(&self, user_id: i64, repo_id: i64, watch: bool) -> Result<()>;

    async fn get_watchers(&self, repo_id: i64) -> Result<Vec<i64>>;

    // --- Issues ---

    async fn create_issue(&self, repo: &Repository, poster: &User, new: &NewIssue) -> Result<Issue>;

    async fn get_issue_by_id(&self, id: i64) -> Result<Option<Issue>>;

    /// Resolve a canonical `owner/repo#index` reference.
    async fn get_issue_by_ref(&self, canonical: &str) -> Result<Option<Issue>>;

    // --- Comments ---

    /// Add a commit-ref comment. Returns false when this commit already
    /// references the issue.
    async fn create_ref_comment(
        &self,
        doer: &User,
        issue: &Issue,
        content: &str,
        commit_sha: &str,
    ) -> Result<bool>;

    /// Close or reopen an issue, recording a status comment. Returns false
    /// when the stored issue was already in the requested state.
    async fn change_issue_status(
        &self,
        doer: &User,
        issue: &Issue,
        is_closed: bool,
        commit_sha: &str,
    ) -> Result<bool>;

    async fn get_comments(&self, issue_id: i64) -> Result<Vec<Comment>>;

    // --- Actions ---

    /// Put one copy of `action` in the feed of the actor, the owner and
    /// every watcher, reading the watchers and inserting the rows in one
    /// transaction. Returns the ids of the inserted rows.
    async fn notify_watchers(&self, action: &Action, owner_id: i64) -> Result<Vec<i64>>;

    async fn get_feeds(&self, query: &FeedQuery) -> Result<Vec<Action>>;

    async fn count_actions(&self) -> Result<i64>;

    // --- Hook tasks ---

    async fn list_hook_tasks(&self, repo_id: Option<i64>) -> Result<Vec<HookTask>>;
}
