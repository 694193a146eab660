// Push pipeline tests — a push goes in, feed rows, issue changes and
// queued hook tasks come out.
//
// Everything runs against in-memory SQLite through the public API. Store
// failures are injected by dropping tables from a seeded connection before
// handing it to the store.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;

use pushfeed::activity::{ActionType, PushCommit, PushCommits};
use pushfeed::activity::feed::FeedQuery;
use pushfeed::config::Settings;
use pushfeed::db::models::{CommentType, Repository, User};
use pushfeed::db::{queries, schema};
use pushfeed::db::{open_in_memory, Database, NewIssue, NewRepository, NewUser, SqliteDatabase};
use pushfeed::issues::KeywordPatterns;
use pushfeed::pipeline::{PushEvent, PushPipeline, PushReport};
use pushfeed::webhook::{HookEvent, WebhookPayload, WebhookSink};

const OLD: &str = "1111111111111111111111111111111111111111";
const NEW: &str = "2222222222222222222222222222222222222222";
const ZERO: &str = "0000000000000000000000000000000000000000";

struct Harness {
    db: SqliteDatabase,
    alice: User,
    repo: Repository,
}

fn settings() -> Settings {
    Settings::with_app_url("https://git.example.com/")
}

fn new_alice() -> NewUser {
    NewUser {
        full_name: "Alice Liddell".to_string(),
        ..NewUser::new("alice", "alice@example.com")
    }
}

/// alice and the myorg account; alice created myorg/repo.
async fn harness() -> Harness {
    let db = open_in_memory().unwrap();
    let alice = db.create_user(&new_alice()).await.unwrap();
    let myorg = db.create_user(&NewUser::new("myorg", "org@example.com")).await.unwrap();
    let repo = db
        .create_repository(&alice, &myorg, &NewRepository::new("repo"))
        .await
        .unwrap();
    Harness { db, alice, repo }
}

/// Same fixture on a raw connection, so tables can be dropped before the
/// store takes it over.
fn seeded_connection() -> (Connection, User, Repository) {
    let conn = Connection::open_in_memory().unwrap();
    schema::create_tables(&conn).unwrap();
    let alice = queries::create_user(&conn, &new_alice()).unwrap();
    let myorg = queries::create_user(&conn, &NewUser::new("myorg", "org@example.com")).unwrap();
    let repo = queries::create_repository(&conn, &alice, &myorg, &NewRepository::new("repo")).unwrap();
    queries::create_issue(&conn, &repo, &alice, &NewIssue::new("bug")).unwrap();
    (conn, alice, repo)
}

fn commit(sha: &str, message: &str) -> PushCommit {
    PushCommit {
        sha1: sha.to_string(),
        message: message.to_string(),
        author_email: "alice@example.com".to_string(),
        author_name: "Alice".to_string(),
    }
}

fn event(alice: &User, repo: &Repository, ref_full_name: &str, old: &str, commits: Vec<PushCommit>) -> PushEvent {
    PushEvent {
        pusher_id: alice.id,
        pusher_name: alice.name.clone(),
        pusher_email: "alice@laptop.local".to_string(),
        repo_owner_id: repo.owner_id,
        repo_name: repo.name.clone(),
        ref_full_name: ref_full_name.to_string(),
        old_commit_id: old.to_string(),
        new_commit_id: NEW.to_string(),
        commits: PushCommits::new(commits),
    }
}

async fn push_with(
    db: &SqliteDatabase,
    hooks: &dyn WebhookSink,
    settings: &Settings,
    event: PushEvent,
) -> Result<PushReport> {
    let patterns = KeywordPatterns::standard().unwrap();
    PushPipeline::new(db, hooks, &patterns, settings)
        .commit_repo_action(event)
        .await
}

async fn push(h: &Harness, ref_full_name: &str, old: &str, commits: Vec<PushCommit>) -> Result<PushReport> {
    push_with(
        &h.db,
        &h.db,
        &settings(),
        event(&h.alice, &h.repo, ref_full_name, old, commits),
    )
    .await
}

async fn add_issues(h: &Harness, n: usize) -> Vec<i64> {
    let mut ids = Vec::new();
    for i in 0..n {
        let issue = h
            .db
            .create_issue(&h.repo, &h.alice, &NewIssue::new(&format!("issue {i}")))
            .await
            .unwrap();
        ids.push(issue.id);
    }
    ids
}

fn feed_of(user_id: i64) -> FeedQuery {
    FeedQuery {
        user_id,
        offset: 0,
        is_profile: false,
    }
}

async fn payloads(db: &SqliteDatabase) -> Vec<(String, serde_json::Value)> {
    db.list_hook_tasks(None)
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.event, serde_json::from_str(&t.payload).unwrap()))
        .collect()
}

struct FailingSink;

#[async_trait]
impl WebhookSink for FailingSink {
    async fn submit(&self, _repo: &Repository, _event: HookEvent, _payload: &WebhookPayload) -> Result<()> {
        anyhow::bail!("endpoint unreachable")
    }
}

// ============================================================
// Branch pushes
// ============================================================

#[tokio::test]
async fn fix_in_older_commit_closes_issue_and_records_push() {
    let h = harness().await;
    let ids = add_issues(&h, 5).await;
    let issue5 = ids[4];

    // newest first
    let report = push(
        &h,
        "refs/heads/main",
        OLD,
        vec![commit("bbb", "update docs"), commit("aaa", "fix #5")],
    )
    .await
    .unwrap();

    assert_eq!(report.op_type, ActionType::CommitRepo);
    assert_eq!(report.ref_name, "main");
    assert_eq!(report.issues.closed, vec![issue5]);
    assert!(report.issue_error.is_none());

    let issue = h.db.get_issue_by_id(issue5).await.unwrap().unwrap();
    assert!(issue.is_closed);
    let closes: Vec<_> = h
        .db
        .get_comments(issue5)
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.kind == CommentType::Close)
        .collect();
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].commit_sha, "aaa");

    let rows = h.db.get_feeds(&feed_of(h.alice.id)).await.unwrap();
    let push_row = &rows[0];
    assert_eq!(push_row.op_type, ActionType::CommitRepo);
    assert_eq!(push_row.ref_name, "main");
    assert_eq!(push_row.act_email, "alice@laptop.local");
    let batch = push_row.push_commits().unwrap();
    assert_eq!(batch.len, 2);
    let shas: Vec<&str> = batch.commits.iter().map(|c| c.sha1.as_str()).collect();
    assert_eq!(shas, vec!["bbb", "aaa"]);
    assert_eq!(batch.compare_url, format!("myorg/repo/compare/{OLD}...{NEW}"));
}

#[tokio::test]
async fn push_reaches_actor_owner_and_watchers_once() {
    let h = harness().await;
    let bob = h.db.create_user(&NewUser::new("bob", "bob@example.com")).await.unwrap();
    h.db.watch_repo(bob.id, h.repo.id, true).await.unwrap();
    h.db.watch_repo(h.alice.id, h.repo.id, true).await.unwrap();

    let report = push(&h, "refs/heads/main", OLD, vec![commit("aaa", "work")]).await.unwrap();
    assert_eq!(report.recipients, 3);

    for user in [h.alice.id, h.repo.owner_id, bob.id] {
        let rows = h.db.get_feeds(&feed_of(user)).await.unwrap();
        let pushes = rows.iter().filter(|r| r.op_type == ActionType::CommitRepo).count();
        assert_eq!(pushes, 1);
    }
}

#[tokio::test]
async fn first_push_marks_repository_non_bare() {
    let h = harness().await;
    assert!(h.repo.is_bare);
    push(&h, "refs/heads/main", ZERO, vec![commit("aaa", "init")]).await.unwrap();
    let repo = h.db.get_repository_by_id(h.repo.id).await.unwrap().unwrap();
    assert!(!repo.is_bare);
}

#[tokio::test]
async fn feed_rows_keep_visibility_from_when_they_were_recorded() {
    let h = harness().await;
    push(&h, "refs/heads/main", OLD, vec![commit("aaa", "public work")]).await.unwrap();

    let mut repo = h.db.get_repository_by_id(h.repo.id).await.unwrap().unwrap();
    repo.is_private = true;
    h.db.update_repository(&repo, true).await.unwrap();
    push(&h, "refs/heads/main", OLD, vec![commit("bbb", "private work")]).await.unwrap();

    let rows = h.db.get_feeds(&feed_of(h.alice.id)).await.unwrap();
    let pushes: Vec<_> = rows.iter().filter(|r| r.op_type == ActionType::CommitRepo).collect();
    assert_eq!(pushes.len(), 2);
    // newest first
    assert!(pushes[0].is_private);
    assert!(!pushes[1].is_private);

    let profile = h
        .db
        .get_feeds(&FeedQuery {
            is_profile: true,
            ..feed_of(h.alice.id)
        })
        .await
        .unwrap();
    let public_pushes: Vec<_> = profile.iter().filter(|r| r.op_type == ActionType::CommitRepo).collect();
    assert_eq!(public_pushes.len(), 1);
    assert_eq!(public_pushes[0].id, pushes[1].id);
    assert!(profile.iter().all(|r| !r.is_private));
}

#[tokio::test]
async fn existing_branch_queues_push_payload_only() {
    let h = harness().await;
    let report = push(&h, "refs/heads/main", OLD, vec![commit("aaa", "work")]).await.unwrap();
    assert_eq!(report.hooks_submitted, vec![HookEvent::Push]);

    let queued = payloads(&h.db).await;
    assert_eq!(queued.len(), 1);
    let (event, p) = &queued[0];
    assert_eq!(event, "push");
    assert_eq!(p["ref"], "refs/heads/main");
    assert_eq!(p["before"], OLD);
    assert_eq!(p["after"], NEW);
    assert_eq!(
        p["compare_url"],
        format!("https://git.example.com/myorg/repo/compare/{OLD}...{NEW}")
    );
    assert_eq!(p["commits"][0]["url"], "https://git.example.com/myorg/repo/commit/aaa");
    assert_eq!(p["commits"][0]["author"]["username"], "alice");
    assert_eq!(p["repository"]["url"], "https://git.example.com/myorg/repo");
    assert_eq!(p["repository"]["owner"]["username"], "myorg");
    assert_eq!(p["pusher"]["name"], "Alice Liddell");
    assert_eq!(p["pusher"]["email"], "alice@example.com");
    assert_eq!(p["pusher"]["username"], "alice");
    assert_eq!(p["sender"]["username"], "alice");
    assert_eq!(p["sender"]["id"], h.alice.id);
}

#[tokio::test]
async fn new_branch_adds_create_payload_and_skips_compare_url() {
    let h = harness().await;
    let report = push(&h, "refs/heads/feature", ZERO, vec![commit("aaa", "start")]).await.unwrap();
    assert_eq!(report.hooks_submitted, vec![HookEvent::Push, HookEvent::Create]);

    let queued = payloads(&h.db).await;
    assert_eq!(queued[0].1["compare_url"], "");
    let (event, create) = &queued[1];
    assert_eq!(event, "create");
    assert_eq!(create["ref"], "feature");
    assert_eq!(create["ref_type"], "branch");

    let rows = h.db.get_feeds(&feed_of(h.alice.id)).await.unwrap();
    assert_eq!(rows[0].push_commits().unwrap().compare_url, "");
}

#[tokio::test]
async fn unknown_commit_author_has_empty_username() {
    let h = harness().await;
    let mut c = commit("aaa", "drive-by");
    c.author_email = "stranger@example.com".to_string();
    push(&h, "refs/heads/main", OLD, vec![c]).await.unwrap();
    let queued = payloads(&h.db).await;
    assert_eq!(queued[0].1["commits"][0]["author"]["username"], "");
    assert_eq!(queued[0].1["commits"][0]["author"]["email"], "stranger@example.com");
}

// ============================================================
// Tags
// ============================================================

#[tokio::test]
async fn tag_push_records_empty_list_and_create_payload_only() {
    let h = harness().await;
    let ids = add_issues(&h, 1).await;

    let report = push(&h, "refs/tags/v1.0", OLD, vec![commit("aaa", "fixes #1")]).await.unwrap();
    assert_eq!(report.op_type, ActionType::PushTag);
    assert_eq!(report.ref_name, "v1.0");
    assert_eq!(report.hooks_submitted, vec![HookEvent::Create]);
    assert!(report.issues.is_empty());
    assert!(!h.db.get_issue_by_id(ids[0]).await.unwrap().unwrap().is_closed);

    let rows = h.db.get_feeds(&feed_of(h.alice.id)).await.unwrap();
    assert_eq!(rows[0].op_type, ActionType::PushTag);
    assert!(rows[0].push_commits().unwrap().commits.is_empty());

    let queued = payloads(&h.db).await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].0, "create");
    assert_eq!(queued[0].1["ref"], "v1.0");
    assert_eq!(queued[0].1["ref_type"], "tag");
}

// ============================================================
// Truncation
// ============================================================

#[tokio::test]
async fn only_newest_hundred_commits_are_scanned() {
    let h = harness().await;
    let ids = add_issues(&h, 2).await;

    let mut commits: Vec<PushCommit> = (0..150).map(|i| commit(&format!("c{i:03}"), "work")).collect();
    commits[149].message = "fixes #1".to_string(); // oldest, beyond the window
    commits[50].message = "fixes #2".to_string();

    let report = push(&h, "refs/heads/main", OLD, commits).await.unwrap();
    assert_eq!(report.issues.closed, vec![ids[1]]);
    assert!(!h.db.get_issue_by_id(ids[0]).await.unwrap().unwrap().is_closed);

    let rows = h.db.get_feeds(&feed_of(h.alice.id)).await.unwrap();
    let batch = rows[0].push_commits().unwrap();
    assert_eq!(batch.len, 150);
    assert_eq!(batch.commits.len(), 5);
    assert_eq!(batch.commits[0].sha1, "c000");
    assert_eq!(batch.commits[4].sha1, "c004");
}

#[tokio::test]
async fn feed_maximum_is_configurable() {
    let h = harness().await;
    let mut settings = settings();
    settings.feed_max_commit_num = 2;
    let commits = (0..4).map(|i| commit(&format!("c{i}"), "work")).collect();
    push_with(&h.db, &h.db, &settings, event(&h.alice, &h.repo, "refs/heads/main", OLD, commits))
        .await
        .unwrap();

    let rows = h.db.get_feeds(&feed_of(h.alice.id)).await.unwrap();
    let batch = rows[0].push_commits().unwrap();
    assert_eq!(batch.commits.len(), 2);
    // the push payload carries the same truncated list
    let queued = payloads(&h.db).await;
    assert_eq!(queued[0].1["commits"].as_array().unwrap().len(), 2);
}

// ============================================================
// Issue references
// ============================================================

#[tokio::test]
async fn user_qualified_reference_is_a_no_op() {
    let h = harness().await;
    add_issues(&h, 9).await;
    let report = push(&h, "refs/heads/main", OLD, vec![commit("aaa", "fixes bob#9")]).await.unwrap();
    assert!(report.issues.is_empty());
    assert!(report.issue_error.is_none());
}

#[tokio::test]
async fn replayed_push_does_not_duplicate_comments() {
    let h = harness().await;
    let ids = add_issues(&h, 1).await;
    let commits = vec![commit("aaa", "closes #1")];

    push(&h, "refs/heads/main", OLD, commits.clone()).await.unwrap();
    let again = push(&h, "refs/heads/main", OLD, commits).await.unwrap();
    assert!(again.issues.is_empty());

    let comments = h.db.get_comments(ids[0]).await.unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments.iter().filter(|c| c.kind == CommentType::CommitRef).count(), 1);
    assert_eq!(comments.iter().filter(|c| c.kind == CommentType::Close).count(), 1);
}

#[tokio::test]
async fn cross_repository_reference_comments_without_closing() {
    let h = harness().await;
    let other = h
        .db
        .create_repository(&h.alice, &h.alice, &NewRepository::new("other"))
        .await
        .unwrap();
    let issue = h.db.create_issue(&other, &h.alice, &NewIssue::new("x")).await.unwrap();

    let report = push(&h, "refs/heads/main", OLD, vec![commit("aaa", "fixes alice/other#1")])
        .await
        .unwrap();
    assert_eq!(report.issues.referenced, vec![issue.id]);
    assert!(report.issues.closed.is_empty());
    assert!(!h.db.get_issue_by_id(issue.id).await.unwrap().unwrap().is_closed);
}

#[tokio::test]
async fn cross_repository_reopen_leaves_issue_closed() {
    let h = harness().await;
    let other = h
        .db
        .create_repository(&h.alice, &h.alice, &NewRepository::new("other"))
        .await
        .unwrap();
    let issue = h.db.create_issue(&other, &h.alice, &NewIssue::new("x")).await.unwrap();
    assert!(h.db.change_issue_status(&h.alice, &issue, true, "seed").await.unwrap());

    let report = push(&h, "refs/heads/main", OLD, vec![commit("aaa", "reopens alice/other#1")])
        .await
        .unwrap();
    assert_eq!(report.issues.referenced, vec![issue.id]);
    assert!(report.issues.reopened.is_empty());
    assert!(h.db.get_issue_by_id(issue.id).await.unwrap().unwrap().is_closed);
}

#[tokio::test]
async fn reopening_an_open_issue_changes_nothing() {
    let h = harness().await;
    let ids = add_issues(&h, 1).await;

    let report = push(&h, "refs/heads/main", OLD, vec![commit("aaa", "reopens #1")]).await.unwrap();
    assert_eq!(report.issues.referenced, vec![ids[0]]);
    assert!(report.issues.reopened.is_empty());
    assert!(!h.db.get_issue_by_id(ids[0]).await.unwrap().unwrap().is_closed);

    let comments = h.db.get_comments(ids[0]).await.unwrap();
    assert!(comments.iter().all(|c| c.kind == CommentType::CommitRef));
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn webhook_failure_is_reported_not_returned() {
    let h = harness().await;
    let report = push_with(
        &h.db,
        &FailingSink,
        &settings(),
        event(&h.alice, &h.repo, "refs/heads/feature", ZERO, vec![commit("aaa", "x")]),
    )
    .await
    .unwrap();

    assert!(report.hooks_submitted.is_empty());
    assert_eq!(report.hook_errors.len(), 2);
    assert!(report.hook_errors[0].contains("endpoint unreachable"));
    assert_eq!(report.recipients, 2);
}

#[tokio::test]
async fn issue_store_failure_does_not_stop_the_push() {
    let (conn, alice, repo) = seeded_connection();
    conn.execute_batch("DROP TABLE issues;").unwrap();
    let db = SqliteDatabase::new(conn);

    let report = push_with(
        &db,
        &db,
        &settings(),
        event(&alice, &repo, "refs/heads/main", OLD, vec![commit("aaa", "fixes #1")]),
    )
    .await
    .unwrap();

    assert!(report.issue_error.is_some());
    assert_eq!(report.recipients, 2);
    assert_eq!(report.hooks_submitted, vec![HookEvent::Push]);
}

#[tokio::test]
async fn fan_out_failure_fails_the_push() {
    let (conn, alice, repo) = seeded_connection();
    conn.execute_batch("DROP TABLE actions;").unwrap();
    let db = SqliteDatabase::new(conn);

    let result = push_with(
        &db,
        &db,
        &settings(),
        event(&alice, &repo, "refs/heads/main", OLD, vec![commit("aaa", "work")]),
    )
    .await;
    assert!(result.is_err());
    assert!(db.list_hook_tasks(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_pusher_or_repository_is_fatal() {
    let h = harness().await;

    let mut ghost = event(&h.alice, &h.repo, "refs/heads/main", OLD, vec![]);
    ghost.pusher_id = 999;
    assert!(push_with(&h.db, &h.db, &settings(), ghost).await.is_err());

    let mut missing = event(&h.alice, &h.repo, "refs/heads/main", OLD, vec![]);
    missing.repo_name = "nothing".to_string();
    assert!(push_with(&h.db, &h.db, &settings(), missing).await.is_err());

    assert_eq!(h.db.count_actions().await.unwrap(), 2);
}
