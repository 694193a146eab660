// System status display — shows DB stats, feed size and the hook queue.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::db::Database;

/// Display system status to the terminal.
pub async fn show(db: &Arc<dyn Database>, db_display_path: &str) -> Result<()> {
    if !Path::new(db_display_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `pushfeed init` to set up the database.");
        return Ok(());
    }

    // Database file size
    let file_size = std::fs::metadata(db_display_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_display_path, file_size);
    println!("Tables: {}", db.table_count().await?);

    let actions = db.count_actions().await?;
    if actions == 0 {
        println!("Feed rows: none yet");
        println!("  Run `pushfeed push` to record a push");
    } else {
        println!("Feed rows: {}", actions);
    }

    let tasks = db.list_hook_tasks(None).await?;
    match tasks.last() {
        Some(last) => println!(
            "Hook tasks: {} queued (latest: {} at {})",
            tasks.len(),
            last.event,
            last.created
        ),
        None => println!("Hook tasks: none queued"),
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn test_show_without_database() {
        let db: Arc<dyn Database> = Arc::new(crate::db::open_in_memory().unwrap());
        show(&db, "/nonexistent/pushfeed.db").await.unwrap();
    }
}
