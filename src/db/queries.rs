// Database queries — CRUD operations for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.
// Operations that touch more than one row open their own transaction.

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{
    Comment, CommentType, HookTask, Issue, NewIssue, NewRepository, NewUser, Repository, User,
};
use crate::activity::action::{Action, ActionType, ActivityEvent, Actor};
use crate::activity::feed::{self, FeedQuery, FEED_PAGE_SIZE};
use crate::issues::reference::IssueRef;

fn conversion_error(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, Type::Integer, msg.into())
}

// --- Users ---

const USER_COLUMNS: &str =
    "id, name, lower_name, full_name, email, avatar_email, use_custom_avatar";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        lower_name: row.get(2)?,
        full_name: row.get(3)?,
        email: row.get(4)?,
        avatar_email: row.get(5)?,
        use_custom_avatar: row.get(6)?,
    })
}

/// Create an account. Names are unique case-insensitively, and so are emails.
pub fn create_user(conn: &Connection, new: &NewUser) -> Result<User> {
    let name = new.name.trim();
    if name.is_empty() || name.contains(['/', '#', ' ']) {
        anyhow::bail!("Invalid user name: {:?}", new.name);
    }
    conn.execute(
        "INSERT INTO users (name, lower_name, full_name, email, avatar_email, use_custom_avatar)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            name,
            name.to_lowercase(),
            new.full_name,
            new.email.trim(),
            new.avatar_email,
            new.use_custom_avatar,
        ],
    )
    .with_context(|| format!("Failed to create user {name}"))?;
    let id = conn.last_insert_rowid();
    get_user_by_id(conn, id)?.context("User vanished right after insert")
}

pub fn get_user_by_id(conn: &Connection, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], user_from_row).optional()?)
}

/// Case-insensitive lookup by login name.
pub fn get_user_by_name(conn: &Connection, name: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower_name = ?1");
    Ok(conn
        .query_row(&sql, params![name.to_lowercase()], user_from_row)
        .optional()?)
}

/// Case-insensitive lookup by email. An empty email never matches.
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim();
    if email.is_empty() {
        return Ok(None);
    }
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE");
    Ok(conn.query_row(&sql, params![email], user_from_row).optional()?)
}

// --- Repositories ---

const REPO_SELECT: &str = "SELECT r.id, r.owner_id, u.name, r.lower_name, r.name, r.description,
            r.website, r.is_private, r.is_bare, r.num_watches, r.num_issues,
            r.num_closed_issues, r.updated_at
     FROM repositories r JOIN users u ON u.id = r.owner_id";

fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_name: row.get(2)?,
        lower_name: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        website: row.get(6)?,
        is_private: row.get(7)?,
        is_bare: row.get(8)?,
        num_watches: row.get(9)?,
        num_issues: row.get(10)?,
        num_closed_issues: row.get(11)?,
        updated: row.get(12)?,
    })
}

pub fn get_repository_by_id(conn: &Connection, id: i64) -> Result<Option<Repository>> {
    let sql = format!("{REPO_SELECT} WHERE r.id = ?1");
    Ok(conn.query_row(&sql, params![id], repo_from_row).optional()?)
}

/// Case-insensitive lookup of an owner's repository.
pub fn get_repository_by_name(
    conn: &Connection,
    owner_id: i64,
    name: &str,
) -> Result<Option<Repository>> {
    let sql = format!("{REPO_SELECT} WHERE r.owner_id = ?1 AND r.lower_name = ?2");
    Ok(conn
        .query_row(&sql, params![owner_id, name.to_lowercase()], repo_from_row)
        .optional()?)
}

/// Create a repository, make the owner its first watcher and record the
/// create-repo activity, all in one transaction.
pub fn create_repository(
    conn: &Connection,
    actor: &User,
    owner: &User,
    new: &NewRepository,
) -> Result<Repository> {
    let name = new.name.trim();
    if name.is_empty() || name.contains(['/', '#', ' ']) {
        anyhow::bail!("Invalid repository name: {:?}", new.name);
    }

    let tx = conn.unchecked_transaction()?;
    if get_repository_by_name(&tx, owner.id, name)?.is_some() {
        anyhow::bail!("Repository {}/{} already exists", owner.name, name);
    }

    tx.execute(
        "INSERT INTO repositories (owner_id, lower_name, name, description, website, is_private)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            owner.id,
            name.to_lowercase(),
            name,
            new.description,
            new.website,
            new.is_private,
        ],
    )?;
    let repo_id = tx.last_insert_rowid();
    set_watch(&tx, owner.id, repo_id, true)?;

    let repo = get_repository_by_id(&tx, repo_id)?.context("Repository vanished right after insert")?;

    let action = Action::record(Actor::from(actor), &repo, ActivityEvent::CreateRepo)?;
    fan_out_rows(&tx, &action, owner.id)
        .with_context(|| format!("Failed to notify watchers of new repository {}", repo.full_name()))?;

    tx.commit()?;
    Ok(repo)
}

/// Persist repository metadata and bump its last-updated time.
///
/// Visibility is only written when `visibility_changed` is set. Feed rows
/// keep the visibility they were recorded with either way.
pub fn update_repository(conn: &Connection, repo: &Repository, visibility_changed: bool) -> Result<()> {
    let updated = if visibility_changed {
        conn.execute(
            "UPDATE repositories
             SET description = ?1, website = ?2, is_bare = ?3, is_private = ?4,
                 updated_at = datetime('now')
             WHERE id = ?5",
            params![repo.description, repo.website, repo.is_bare, repo.is_private, repo.id],
        )?
    } else {
        conn.execute(
            "UPDATE repositories
             SET description = ?1, website = ?2, is_bare = ?3, updated_at = datetime('now')
             WHERE id = ?4",
            params![repo.description, repo.website, repo.is_bare, repo.id],
        )?
    };
    if updated == 0 {
        anyhow::bail!("Repository {} does not exist", repo.id);
    }
    Ok(())
}

// --- Watches ---

fn set_watch(conn: &Connection, user_id: i64, repo_id: i64, watch: bool) -> Result<()> {
    let changed = if watch {
        conn.execute(
            "INSERT OR IGNORE INTO watches (user_id, repo_id) VALUES (?1, ?2)",
            params![user_id, repo_id],
        )?
    } else {
        conn.execute(
            "DELETE FROM watches WHERE user_id = ?1 AND repo_id = ?2",
            params![user_id, repo_id],
        )?
    };
    if changed > 0 {
        let delta: i64 = if watch { 1 } else { -1 };
        conn.execute(
            "UPDATE repositories SET num_watches = num_watches + ?1 WHERE id = ?2",
            params![delta, repo_id],
        )?;
    }
    Ok(())
}

/// Start or stop watching a repository. Repeating either is a no-op.
pub fn watch_repo(conn: &Connection, user_id: i64, repo_id: i64, watch: bool) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    set_watch(&tx, user_id, repo_id, watch)?;
    tx.commit()?;
    Ok(())
}

/// Ids of every user watching a repository.
pub fn get_watchers(conn: &Connection, repo_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT user_id FROM watches WHERE repo_id = ?1 ORDER BY user_id")?;
    let rows = stmt.query_map(params![repo_id], |row| row.get(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

// --- Issues ---

const ISSUE_COLUMNS: &str =
    "id, repo_id, idx, poster_id, name, content, is_pull, is_closed, num_comments";

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        index: row.get(2)?,
        poster_id: row.get(3)?,
        name: row.get(4)?,
        content: row.get(5)?,
        is_pull: row.get(6)?,
        is_closed: row.get(7)?,
        num_comments: row.get(8)?,
    })
}

/// Open a new issue with the next free `#index` in the repository.
pub fn create_issue(conn: &Connection, repo: &Repository, poster: &User, new: &NewIssue) -> Result<Issue> {
    let tx = conn.unchecked_transaction()?;
    let index: i64 = tx.query_row(
        "SELECT COALESCE(MAX(idx), 0) + 1 FROM issues WHERE repo_id = ?1",
        params![repo.id],
        |row| row.get(0),
    )?;
    tx.execute(
        "INSERT INTO issues (repo_id, idx, poster_id, name, content, is_pull)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![repo.id, index, poster.id, new.title, new.content, new.is_pull],
    )?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE repositories SET num_issues = num_issues + 1 WHERE id = ?1",
        params![repo.id],
    )?;
    tx.commit()?;
    get_issue_by_id(conn, id)?.context("Issue vanished right after insert")
}

pub fn get_issue_by_id(conn: &Connection, id: i64) -> Result<Option<Issue>> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], issue_from_row).optional()?)
}

pub fn get_issue_by_index(conn: &Connection, repo_id: i64, index: i64) -> Result<Option<Issue>> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE repo_id = ?1 AND idx = ?2");
    Ok(conn
        .query_row(&sql, params![repo_id, index], issue_from_row)
        .optional()?)
}

/// Resolve `owner/repo#index`. Malformed references and unknown owners,
/// repositories or issues all come back as None.
pub fn get_issue_by_ref(conn: &Connection, canonical: &str) -> Result<Option<Issue>> {
    let Some(r) = IssueRef::parse(canonical) else {
        return Ok(None);
    };
    let Some(owner) = get_user_by_name(conn, &r.owner)? else {
        return Ok(None);
    };
    let Some(repo) = get_repository_by_name(conn, owner.id, &r.repo)? else {
        return Ok(None);
    };
    get_issue_by_index(conn, repo.id, r.index)
}

// --- Comments ---

fn insert_comment(
    conn: &Connection,
    kind: CommentType,
    poster_id: i64,
    issue_id: i64,
    commit_sha: &str,
    content: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO comments (kind, poster_id, issue_id, commit_sha, content)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![kind.as_i64(), poster_id, issue_id, commit_sha, content],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute(
        "UPDATE issues SET num_comments = num_comments + 1 WHERE id = ?1",
        params![issue_id],
    )?;
    Ok(id)
}

/// Add a commit-ref comment unless this commit already references the
/// issue. Returns whether a comment was written.
pub fn create_ref_comment(
    conn: &Connection,
    doer: &User,
    issue: &Issue,
    content: &str,
    commit_sha: &str,
) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM comments WHERE kind = ?1 AND issue_id = ?2 AND commit_sha = ?3",
        params![CommentType::CommitRef.as_i64(), issue.id, commit_sha],
        |row| row.get(0),
    )?;
    if exists {
        return Ok(false);
    }
    insert_comment(&tx, CommentType::CommitRef, doer.id, issue.id, commit_sha, content)?;
    tx.commit()?;
    Ok(true)
}

/// Close or reopen an issue and record who did it and which commit
/// triggered it, atomically.
///
/// The status flip is a compare-and-set on the stored state: if another
/// writer got there first nothing is written and false is returned.
pub fn change_issue_status(
    conn: &Connection,
    doer: &User,
    issue: &Issue,
    is_closed: bool,
    commit_sha: &str,
) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let flipped = tx.execute(
        "UPDATE issues SET is_closed = ?1, updated_at = datetime('now')
         WHERE id = ?2 AND is_closed = ?3",
        params![is_closed, issue.id, !is_closed],
    )?;
    if flipped == 0 {
        return Ok(false);
    }

    let kind = if is_closed {
        CommentType::Close
    } else {
        CommentType::Reopen
    };
    insert_comment(&tx, kind, doer.id, issue.id, commit_sha, "")?;

    let delta: i64 = if is_closed { 1 } else { -1 };
    tx.execute(
        "UPDATE repositories SET num_closed_issues = num_closed_issues + ?1 WHERE id = ?2",
        params![delta, issue.repo_id],
    )?;
    tx.commit()?;
    Ok(true)
}

/// All comments on an issue, oldest first.
pub fn get_comments(conn: &Connection, issue_id: i64) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, poster_id, issue_id, commit_sha, content, created_at
         FROM comments WHERE issue_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![issue_id], |row| {
        let kind: i64 = row.get(1)?;
        Ok(Comment {
            id: row.get(0)?,
            kind: CommentType::from_i64(kind)
                .ok_or_else(|| conversion_error(1, format!("unknown comment kind {kind}")))?,
            poster_id: row.get(2)?,
            issue_id: row.get(3)?,
            commit_sha: row.get(4)?,
            content: row.get(5)?,
            created: row.get(6)?,
        })
    })?;
    let mut comments = Vec::new();
    for row in rows {
        comments.push(row?);
    }
    Ok(comments)
}

// --- Actions ---

fn insert_action_rows(conn: &Connection, rows: &[Action]) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "INSERT INTO actions
            (user_id, op_type, act_user_id, act_user_name, act_email, repo_id,
             repo_user_name, repo_name, ref_name, is_private, content, created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;
    let mut ids = Vec::with_capacity(rows.len());
    for a in rows {
        stmt.execute(params![
            a.user_id,
            a.op_type.as_i64(),
            a.act_user_id,
            a.act_user_name,
            a.act_email,
            a.repo_id,
            a.repo_user_name,
            a.repo_name,
            a.ref_name,
            a.is_private,
            a.content,
            a.created,
        ])?;
        ids.push(conn.last_insert_rowid());
    }
    Ok(ids)
}

fn fan_out_rows(conn: &Connection, action: &Action, owner_id: i64) -> Result<Vec<i64>> {
    let watchers = get_watchers(conn, action.repo_id)?;
    insert_action_rows(conn, &feed::fan_out(action, owner_id, &watchers))
}

/// Copy an action into the feed of the actor, the owner and every current
/// watcher. The watcher list is read in the same transaction as the
/// inserts, and either all rows land or none do.
pub fn notify_watchers(conn: &Connection, action: &Action, owner_id: i64) -> Result<Vec<i64>> {
    let tx = conn.unchecked_transaction()?;
    let ids = fan_out_rows(&tx, action, owner_id)?;
    tx.commit()?;
    Ok(ids)
}

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<Action> {
    let op: i64 = row.get(2)?;
    Ok(Action {
        id: row.get(0)?,
        user_id: row.get(1)?,
        op_type: ActionType::from_i64(op)
            .ok_or_else(|| conversion_error(2, format!("unknown action type {op}")))?,
        act_user_id: row.get(3)?,
        act_user_name: row.get(4)?,
        act_email: row.get(5)?,
        repo_id: row.get(6)?,
        repo_user_name: row.get(7)?,
        repo_name: row.get(8)?,
        ref_name: row.get(9)?,
        is_private: row.get(10)?,
        content: row.get(11)?,
        created: row.get(12)?,
    })
}

/// One page of a user's feed, newest first.
pub fn get_feeds(conn: &Connection, query: &FeedQuery) -> Result<Vec<Action>> {
    let mut sql = String::from(
        "SELECT id, user_id, op_type, act_user_id, act_user_name, act_email, repo_id,
                repo_user_name, repo_name, ref_name, is_private, content, created
         FROM actions WHERE user_id = ?1",
    );
    if query.is_profile {
        sql.push_str(" AND is_private = 0 AND act_user_id = ?1");
    }
    sql.push_str(" ORDER BY id DESC LIMIT ?2 OFFSET ?3");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![query.user_id, FEED_PAGE_SIZE, query.offset],
        action_from_row,
    )?;
    let mut actions = Vec::new();
    for row in rows {
        actions.push(row?);
    }
    Ok(actions)
}

pub fn count_actions(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM actions", [], |row| row.get(0))?)
}

// --- Hook tasks ---

pub fn insert_hook_task(conn: &Connection, repo_id: i64, event: &str, payload: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO hook_tasks (repo_id, event, payload) VALUES (?1, ?2, ?3)",
        params![repo_id, event, payload],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Queued hook tasks in submission order, optionally for one repository.
pub fn list_hook_tasks(conn: &Connection, repo_id: Option<i64>) -> Result<Vec<HookTask>> {
    let mut stmt = conn.prepare(
        "SELECT id, repo_id, event, payload, created_at FROM hook_tasks
         WHERE ?1 IS NULL OR repo_id = ?1
         ORDER BY id",
    )?;
    let rows = stmt.query_map(params![repo_id], |row| {
        Ok(HookTask {
            id: row.get(0)?,
            repo_id: row.get(1)?,
            event: row.get(2)?,
            payload: row.get(3)?,
            created: row.get(4)?,
        })
    })?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?);
    }
    Ok(tasks)
}
