// Database schema — table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version` table
// tracks which migrations have run, and each migration is a function that
// executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Number of tables `create_tables` leaves behind.
pub const TABLE_COUNT: i64 = 8;

/// Create all tables if they don't exist yet.
///
/// This is idempotent — safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            lower_name TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            avatar_email TEXT NOT NULL DEFAULT '',
            use_custom_avatar INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS repositories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL REFERENCES users(id),
            lower_name TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            website TEXT NOT NULL DEFAULT '',
            is_private INTEGER NOT NULL DEFAULT 0,
            is_bare INTEGER NOT NULL DEFAULT 1,        -- cleared by the first push
            num_watches INTEGER NOT NULL DEFAULT 0,
            num_issues INTEGER NOT NULL DEFAULT 0,
            num_closed_issues INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (owner_id, lower_name)
        );

        -- Who follows a repository's activity
        CREATE TABLE IF NOT EXISTS watches (
            user_id INTEGER NOT NULL REFERENCES users(id),
            repo_id INTEGER NOT NULL REFERENCES repositories(id),
            PRIMARY KEY (user_id, repo_id)
        );

        CREATE TABLE IF NOT EXISTS issues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repo_id INTEGER NOT NULL REFERENCES repositories(id),
            idx INTEGER NOT NULL,                     -- per-repository #number
            poster_id INTEGER NOT NULL REFERENCES users(id),
            name TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            is_pull INTEGER NOT NULL DEFAULT 0,
            is_closed INTEGER NOT NULL DEFAULT 0,
            num_comments INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (repo_id, idx)
        );

        CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind INTEGER NOT NULL,                    -- 0 plain, 1 reopen, 2 close, 4 commit ref
            poster_id INTEGER NOT NULL REFERENCES users(id),
            issue_id INTEGER NOT NULL REFERENCES issues(id),
            commit_sha TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Feed rows: one per recipient per action, never updated
        CREATE TABLE IF NOT EXISTS actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,                 -- recipient
            op_type INTEGER NOT NULL,
            act_user_id INTEGER NOT NULL,
            act_user_name TEXT NOT NULL,
            act_email TEXT NOT NULL DEFAULT '',
            repo_id INTEGER NOT NULL,
            repo_user_name TEXT NOT NULL,
            repo_name TEXT NOT NULL,
            ref_name TEXT NOT NULL DEFAULT '',
            is_private INTEGER NOT NULL DEFAULT 0,    -- snapshot at creation
            content TEXT NOT NULL DEFAULT '',
            created TEXT NOT NULL
        );

        -- Outbound webhook payloads waiting for delivery
        CREATE TABLE IF NOT EXISTS hook_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repo_id INTEGER NOT NULL,
            event TEXT NOT NULL,                      -- 'push' or 'create'
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_actions_user
            ON actions(user_id, id);

        CREATE INDEX IF NOT EXISTS idx_comments_issue
            ON comments(issue_id);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: at most one commit-ref comment per (issue, commit), so
    // replayed pushes and racing hooks cannot duplicate references.
    run_migration(conn, 2, |c| {
        c.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_comments_commit_ref
                ON comments(issue_id, commit_sha) WHERE kind = 4;",
        )
    })?;

    // Migration v3: hook task lookups by repository.
    run_migration(conn, 3, |c| {
        c.execute_batch("CREATE INDEX IF NOT EXISTS idx_hook_tasks_repo ON hook_tasks(repo_id);")
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        // Running create_tables twice should not error
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_table_count() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        assert_eq!(table_count(&conn).unwrap(), TABLE_COUNT);
    }

    #[test]
    fn test_all_migrations_recorded() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let max: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(max, 3);
    }
}
