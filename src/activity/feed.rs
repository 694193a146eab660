// Watcher fan-out and feed retrieval.
//
// One action becomes one row per recipient: the actor, the repository
// owner, and everyone watching the repository. The store reads the
// watchers and inserts all rows for one action in a single transaction, so
// a failed fan-out leaves no partial feed behind.

use anyhow::{Context, Result};
use tracing::info;

use super::action::Action;
use crate::db::Database;

/// Rows returned per feed page.
pub const FEED_PAGE_SIZE: u32 = 20;

/// Which rows `get_feeds` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedQuery {
    pub user_id: i64,
    pub offset: u32,
    /// Profile view: only the user's own actions on public repositories.
    pub is_profile: bool,
}

/// Everyone who should see an action: actor first, then the owner, then
/// watchers, each user once.
pub fn recipients(actor_id: i64, owner_id: i64, watchers: &[i64]) -> Vec<i64> {
    let mut out = vec![actor_id];
    for id in std::iter::once(owner_id).chain(watchers.iter().copied()) {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Copy an action once per recipient.
pub fn fan_out(action: &Action, owner_id: i64, watchers: &[i64]) -> Vec<Action> {
    recipients(action.act_user_id, owner_id, watchers)
        .into_iter()
        .map(|user_id| Action {
            id: 0,
            user_id,
            ..action.clone()
        })
        .collect()
}

/// Persist an action into the feed of every interested user.
///
/// Returns the ids of the inserted rows. Any failure is returned to the
/// caller; the triggering operation must fail with it.
pub async fn notify_watchers(db: &dyn Database, action: &Action, owner_id: i64) -> Result<Vec<i64>> {
    let ids = db
        .notify_watchers(action, owner_id)
        .await
        .with_context(|| format!("Failed to notify watchers of {}", action.repo_path()))?;

    info!(
        op = %action.op_type,
        repo = %action.repo_path(),
        recipients = ids.len(),
        "Activity recorded"
    );
    Ok(ids)
}

/// One page of a user's feed, newest first.
pub async fn get_feeds(db: &dyn Database, query: FeedQuery) -> Result<Vec<Action>> {
    db.get_feeds(&query)
        .await
        .with_context(|| format!("Failed to load feed for user {}", query.user_id))
}
