// Feed entries for repository events other than pushes.
//
// Each recorder snapshots the event into one Action and fans it out to the
// actor, the repository owner and the watchers. Fan-out failures are
// returned so the triggering operation can fail with them.

use anyhow::Result;

use crate::activity::action::{Action, ActivityEvent, Actor};
use crate::activity::feed;
use crate::db::models::{Issue, NewRepository, Repository, User};
use crate::db::Database;

/// Record any activity performed by an account. Returns the feed row ids.
pub async fn record_activity(
    db: &dyn Database,
    actor: &User,
    repo: &Repository,
    event: ActivityEvent<'_>,
) -> Result<Vec<i64>> {
    let action = Action::record(Actor::from(actor), repo, event)?;
    feed::notify_watchers(db, &action, repo.owner_id).await
}

/// Create a repository for `owner`. The owner starts out watching it and
/// the create-repo entry is written in the same transaction.
pub async fn new_repo(
    db: &dyn Database,
    actor: &User,
    owner: &User,
    new: &NewRepository,
) -> Result<Repository> {
    db.create_repository(actor, owner, new).await
}

/// `repo` already carries its new name.
pub async fn rename_repo_action(
    db: &dyn Database,
    actor: &User,
    old_name: &str,
    repo: &Repository,
) -> Result<Vec<i64>> {
    record_activity(db, actor, repo, ActivityEvent::RenameRepo { old_name }).await
}

/// `repo` already belongs to its new owner; the entry reaches the new
/// owner and the repository's watchers.
pub async fn transfer_repo_action(
    db: &dyn Database,
    actor: &User,
    old_owner: &User,
    repo: &Repository,
) -> Result<Vec<i64>> {
    record_activity(
        db,
        actor,
        repo,
        ActivityEvent::TransferRepo {
            old_owner_name: &old_owner.lower_name,
            new_owner_name: &repo.owner_name,
        },
    )
    .await
}

pub async fn merge_pull_request_action(
    db: &dyn Database,
    actor: &User,
    repo: &Repository,
    pull: &Issue,
) -> Result<Vec<i64>> {
    record_activity(db, actor, repo, ActivityEvent::MergePullRequest { pull }).await
}

/// New issue or pull request, depending on `issue.is_pull`.
pub async fn create_issue_action(
    db: &dyn Database,
    actor: &User,
    repo: &Repository,
    issue: &Issue,
) -> Result<Vec<i64>> {
    let event = if issue.is_pull {
        ActivityEvent::CreatePullRequest { pull: issue }
    } else {
        ActivityEvent::CreateIssue { issue }
    };
    record_activity(db, actor, repo, event).await
}

pub async fn comment_issue_action(
    db: &dyn Database,
    actor: &User,
    repo: &Repository,
    issue: &Issue,
    comment: &str,
) -> Result<Vec<i64>> {
    record_activity(db, actor, repo, ActivityEvent::CommentIssue { issue, comment }).await
}
