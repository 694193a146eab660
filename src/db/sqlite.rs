// SqliteDatabase — rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points.
//
// It also implements WebhookSink by queueing payloads as hook tasks, so a
// push handled through the CLI leaves an inspectable delivery queue.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::debug;

use super::models::{Comment, HookTask, Issue, NewIssue, NewRepository, NewUser, Repository, User};
use super::queries;
use super::traits::Database;
use crate::activity::action::Action;
use crate::activity::feed::FeedQuery;
use crate::webhook::{HookEvent, WebhookPayload, WebhookSink};

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn create_user(&self, new: &NewUser) -> Result<User> {
        let conn = self.conn.lock().await;
        queries::create_user(&conn, new)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        queries::get_user_by_id(&conn, id)
    }

    async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        queries::get_user_by_name(&conn, name)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        queries::get_user_by_email(&conn, email)
    }

    async fn create_repository(
        &self,
        actor: &User,
        owner: &User,
        new: &NewRepository,
    ) -> Result<Repository> {
        let conn = self.conn.lock().await;
        queries::create_repository(&conn, actor, owner, new)
    }

    async fn get_repository_by_id(&self, id: i64) -> Result<Option<Repository>> {
        let conn = self.conn.lock().await;
        queries::get_repository_by_id(&conn, id)
    }

    async fn get_repository_by_name(&self, owner_id: i64, name: &str) -> Result<Option<Repository>> {
        let conn = self.conn.lock().await;
        queries::get_repository_by_name(&conn, owner_id, name)
    }

    async fn update_repository(&self, repo: &Repository, visibility_changed: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::update_repository(&conn, repo, visibility_changed)
    }

    async fn watch_repo(&self, user_id: i64, repo_id: i64, watch: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::watch_repo(&conn, user_id, repo_id, watch)
    }

    async fn get_watchers(&self, repo_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        queries::get_watchers(&conn, repo_id)
    }

    async fn create_issue(&self, repo: &Repository, poster: &User, new: &NewIssue) -> Result<Issue> {
        let conn = self.conn.lock().await;
        queries::create_issue(&conn, repo, poster, new)
    }

    async fn get_issue_by_id(&self, id: i64) -> Result<Option<Issue>> {
        let conn = self.conn.lock().await;
        queries::get_issue_by_id(&conn, id)
    }

    async fn get_issue_by_ref(&self, canonical: &str) -> Result<Option<Issue>> {
        let conn = self.conn.lock().await;
        queries::get_issue_by_ref(&conn, canonical)
    }

    async fn create_ref_comment(
        &self,
        doer: &User,
        issue: &Issue,
        content: &str,
        commit_sha: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::create_ref_comment(&conn, doer, issue, content, commit_sha)
    }

    async fn change_issue_status(
        &self,
        doer: &User,
        issue: &Issue,
        is_closed: bool,
        commit_sha: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::change_issue_status(&conn, doer, issue, is_closed, commit_sha)
    }

    async fn get_comments(&self, issue_id: i64) -> Result<Vec<Comment>> {
        let conn = self.conn.lock().await;
        queries::get_comments(&conn, issue_id)
    }

    async fn notify_watchers(&self, action: &Action, owner_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        queries::notify_watchers(&conn, action, owner_id)
    }

    async fn get_feeds(&self, query: &FeedQuery) -> Result<Vec<Action>> {
        let conn = self.conn.lock().await;
        queries::get_feeds(&conn, query)
    }

    async fn count_actions(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::count_actions(&conn)
    }

    async fn list_hook_tasks(&self, repo_id: Option<i64>) -> Result<Vec<HookTask>> {
        let conn = self.conn.lock().await;
        queries::list_hook_tasks(&conn, repo_id)
    }
}

#[async_trait]
impl WebhookSink for SqliteDatabase {
    async fn submit(&self, repo: &Repository, event: HookEvent, payload: &WebhookPayload) -> Result<()> {
        let json = serde_json::to_string(payload).context("Failed to serialize webhook payload")?;
        let conn = self.conn.lock().await;
        let id = queries::insert_hook_task(&conn, repo.id, event.as_str(), &json)
            .with_context(|| format!("Failed to queue {event} hook for {}", repo.full_name()))?;
        debug!(task = id, repo = %repo.full_name(), %event, "Hook task queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;
    use crate::webhook::payload::{build_create_payload, PayloadRepo, PayloadUser};

    async fn test_db() -> SqliteDatabase {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        SqliteDatabase::new(conn)
    }

    #[tokio::test]
    async fn test_trait_user_roundtrip() {
        let db = test_db().await;
        assert!(db.get_user_by_name("alice").await.unwrap().is_none());
        let alice = db.create_user(&NewUser::new("alice", "alice@example.com")).await.unwrap();
        assert_eq!(db.get_user_by_id(alice.id).await.unwrap(), Some(alice.clone()));
        assert_eq!(db.get_user_by_email("ALICE@example.com").await.unwrap(), Some(alice));
    }

    #[tokio::test]
    async fn test_trait_table_count() {
        let db = test_db().await;
        assert_eq!(db.table_count().await.unwrap(), super::super::schema::TABLE_COUNT);
    }

    #[tokio::test]
    async fn test_trait_repository_and_watchers() {
        let db = test_db().await;
        let alice = db.create_user(&NewUser::new("alice", "alice@example.com")).await.unwrap();
        let bob = db.create_user(&NewUser::new("bob", "bob@example.com")).await.unwrap();
        let repo = db
            .create_repository(&alice, &alice, &NewRepository::new("repo"))
            .await
            .unwrap();
        db.watch_repo(bob.id, repo.id, true).await.unwrap();
        assert_eq!(db.get_watchers(repo.id).await.unwrap(), vec![alice.id, bob.id]);
        let found = db.get_repository_by_name(alice.id, "REPO").await.unwrap().unwrap();
        assert_eq!(found.id, repo.id);
        assert_eq!(db.count_actions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submit_queues_hook_task() {
        let db = test_db().await;
        let alice = db.create_user(&NewUser::new("alice", "alice@example.com")).await.unwrap();
        let repo = db
            .create_repository(&alice, &alice, &NewRepository::new("repo"))
            .await
            .unwrap();

        let payload = WebhookPayload::Create(build_create_payload(
            "main",
            "branch",
            PayloadRepo {
                id: repo.id,
                name: repo.name.clone(),
                url: String::new(),
                description: String::new(),
                website: String::new(),
                watchers: 1,
                owner: Default::default(),
                private: false,
            },
            PayloadUser {
                id: alice.id,
                username: alice.name.clone(),
                avatar_url: String::new(),
            },
        ));
        db.submit(&repo, HookEvent::Create, &payload).await.unwrap();

        let tasks = db.list_hook_tasks(Some(repo.id)).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].event, "create");
        let json: serde_json::Value = serde_json::from_str(&tasks[0].payload).unwrap();
        assert_eq!(json["ref_type"], "branch");
    }
}
