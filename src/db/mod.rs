// Database layer — SQLite storage for users, repositories, issues, the
// activity feed and queued webhook tasks.
//
// We use rusqlite with the "bundled" feature so there's no system SQLite
// dependency. The database file lives wherever PUSHFEED_DB_PATH points
// (defaults to ./pushfeed.db).

pub mod models;
pub mod queries;
pub mod schema;
pub mod sqlite;
pub mod traits;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

pub use models::{NewIssue, NewRepository, NewUser};
pub use sqlite::SqliteDatabase;
pub use traits::Database;

/// Open (or create) the database and run migrations.
///
/// This is the main entry point — called by `pushfeed init` and by any
/// command that needs database access.
pub fn initialize(db_path: &str) -> Result<Connection> {
    // Create parent directories if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Open an existing database (fails if it doesn't exist yet).
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `pushfeed init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // Pick up migrations added since the database was created.
    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Create the database if needed and wrap it in the shared store.
pub fn initialize_sqlite(db_path: &str) -> Result<Arc<SqliteDatabase>> {
    Ok(Arc::new(SqliteDatabase::new(initialize(db_path)?)))
}

/// Open an existing database as the shared store.
pub fn open_sqlite(db_path: &str) -> Result<Arc<SqliteDatabase>> {
    Ok(Arc::new(SqliteDatabase::new(open(db_path)?)))
}

/// A fresh in-memory store with the schema applied.
pub fn open_in_memory() -> Result<SqliteDatabase> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::create_tables(&conn)?;
    Ok(SqliteDatabase::new(conn))
}
