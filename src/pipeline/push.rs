// Push pipeline: git push -> feed entry, issue updates, webhooks.
//
// For every push reported by the git hook this pipeline:
// 1. Loads the pusher, the repository and its owner
// 2. Marks the repository as no longer bare
// 3. Scans commit messages for issue references and close/reopen keywords
// 4. Records one commit-push or push-tag action in every watcher's feed
// 5. Queues push and create webhook payloads
//
// Steps 1, 2 and 4 are fatal. Issue linking and webhook submission are
// best-effort: failures are logged and reported, never returned.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::activity::action::{Action, ActionType, ActivityEvent, Actor};
use crate::activity::commits::{PushCommits, MAX_SCANNED_COMMITS};
use crate::activity::feed;
use crate::config::Settings;
use crate::db::models::Repository;
use crate::db::Database;
use crate::issues::{IssueUpdateSummary, IssueUpdater, KeywordPatterns};
use crate::webhook::payload::{
    build_create_payload, build_push_payload, compose_repo, PayloadAuthor, PayloadUser, PushContext,
};
use crate::webhook::{HookEvent, WebhookPayload, WebhookSink};

const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";

/// One push as reported by the git hook.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub pusher_id: i64,
    /// Git-level identity of the pusher; recorded verbatim on the action.
    pub pusher_name: String,
    pub pusher_email: String,
    pub repo_owner_id: i64,
    pub repo_name: String,
    /// e.g. `refs/heads/main` or `refs/tags/v1.0`
    pub ref_full_name: String,
    pub old_commit_id: String,
    pub new_commit_id: String,
    /// Newest first.
    pub commits: PushCommits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Branch,
    Tag,
}

impl RefKind {
    pub fn of(ref_full_name: &str) -> Self {
        if ref_full_name.starts_with(TAG_PREFIX) {
            RefKind::Tag
        } else {
            RefKind::Branch
        }
    }
}

/// Short name of a ref: `refs/heads/main` -> `main`, `refs/tags/v1` -> `v1`.
pub fn ref_end_name(ref_full_name: &str) -> &str {
    ref_full_name
        .strip_prefix(BRANCH_PREFIX)
        .or_else(|| ref_full_name.strip_prefix(TAG_PREFIX))
        .unwrap_or(ref_full_name)
}

/// The all-zero object id git reports for a ref that did not exist.
pub fn is_empty_commit_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b == b'0')
}

/// What one push did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub op_type: ActionType,
    /// Short ref name recorded on the action.
    pub ref_name: String,
    /// Number of feed rows written.
    pub recipients: usize,
    pub issues: IssueUpdateSummary,
    /// Set when issue linking stopped on a store error.
    pub issue_error: Option<String>,
    /// Hooks accepted by the sink, in submission order.
    pub hooks_submitted: Vec<HookEvent>,
    pub hook_errors: Vec<String>,
}

pub struct PushPipeline<'a> {
    db: &'a dyn Database,
    hooks: &'a dyn WebhookSink,
    patterns: &'a KeywordPatterns,
    settings: &'a Settings,
}

impl<'a> PushPipeline<'a> {
    pub fn new(
        db: &'a dyn Database,
        hooks: &'a dyn WebhookSink,
        patterns: &'a KeywordPatterns,
        settings: &'a Settings,
    ) -> Self {
        Self {
            db,
            hooks,
            patterns,
            settings,
        }
    }

    /// Record a push to a branch or tag.
    pub async fn commit_repo_action(&self, event: PushEvent) -> Result<PushReport> {
        let PushEvent {
            pusher_id,
            pusher_name,
            pusher_email,
            repo_owner_id,
            repo_name,
            ref_full_name,
            old_commit_id,
            new_commit_id,
            mut commits,
        } = event;

        let actor = self
            .db
            .get_user_by_id(pusher_id)
            .await
            .context("Failed to load pusher")?
            .with_context(|| format!("User {pusher_id} does not exist"))?;

        let mut repo = self
            .db
            .get_repository_by_name(repo_owner_id, &repo_name)
            .await
            .context("Failed to load repository")?
            .with_context(|| format!("Repository {repo_name} of user {repo_owner_id} does not exist"))?;

        let owner = self
            .db
            .get_user_by_id(repo.owner_id)
            .await
            .context("Failed to load repository owner")?
            .with_context(|| format!("Owner of {} does not exist", repo.full_name()))?;

        repo.is_bare = false;
        self.db
            .update_repository(&repo, false)
            .await
            .with_context(|| format!("Failed to update repository {}", repo.full_name()))?;

        let kind = RefKind::of(&ref_full_name);
        let ref_name = ref_end_name(&ref_full_name).to_string();
        let mut is_new_branch = false;
        let mut issues = IssueUpdateSummary::default();
        let mut issue_error = None;

        match kind {
            RefKind::Tag => commits = PushCommits::empty(),
            RefKind::Branch => {
                if is_empty_commit_id(&old_commit_id) {
                    is_new_branch = true;
                } else {
                    commits.compare_url = format!(
                        "{}/{}/compare/{}...{}",
                        repo.owner_name, repo.name, old_commit_id, new_commit_id
                    );
                }

                commits.keep_newest(MAX_SCANNED_COMMITS);
                let updater = IssueUpdater::new(self.db, self.patterns, self.settings);
                match updater.update_issues(&actor, &repo, &commits).await {
                    Ok(summary) => issues = summary,
                    Err(e) => {
                        warn!(repo = %repo.full_name(), error = %e, "Failed to update issues from commits");
                        issue_error = Some(format!("{e:#}"));
                    }
                }
            }
        }

        commits.keep_newest(self.settings.feed_max_commit_num);

        let actor_identity = Actor {
            id: actor.id,
            name: &pusher_name,
            email: &pusher_email,
        };
        let activity = match kind {
            RefKind::Tag => ActivityEvent::PushTag {
                ref_name: &ref_name,
                commits: &commits,
            },
            RefKind::Branch => ActivityEvent::CommitRepo {
                ref_name: &ref_name,
                commits: &commits,
            },
        };
        let action = Action::record(actor_identity, &repo, activity)?;
        let rows = feed::notify_watchers(self.db, &action, repo.owner_id).await?;

        let mut report = PushReport {
            op_type: action.op_type,
            ref_name: ref_name.clone(),
            recipients: rows.len(),
            issues,
            issue_error,
            hooks_submitted: Vec::new(),
            hook_errors: Vec::new(),
        };

        let payload_repo = compose_repo(&repo, &owner, self.settings);
        let sender = PayloadUser::from_user(&actor, self.settings);

        match kind {
            RefKind::Branch => {
                let pusher = self.pusher_author(&pusher_name).await;
                commits.resolve_authors(self.db, self.settings).await;
                let push = build_push_payload(
                    PushContext {
                        ref_full_name: &ref_full_name,
                        old_commit_id: &old_commit_id,
                        new_commit_id: &new_commit_id,
                        repo: payload_repo.clone(),
                        pusher,
                        sender: sender.clone(),
                    },
                    &commits,
                    &repo,
                    self.settings,
                );
                self.submit(&repo, WebhookPayload::Push(push), &mut report).await;

                if is_new_branch {
                    let create = build_create_payload(&ref_name, "branch", payload_repo, sender);
                    self.submit(&repo, WebhookPayload::Create(create), &mut report).await;
                }
            }
            RefKind::Tag => {
                let create = build_create_payload(&ref_name, "tag", payload_repo, sender);
                self.submit(&repo, WebhookPayload::Create(create), &mut report).await;
            }
        }

        info!(
            repo = %repo.full_name(),
            ref_name = %report.ref_name,
            op = %report.op_type,
            recipients = report.recipients,
            closed = report.issues.closed.len(),
            reopened = report.issues.reopened.len(),
            hooks = report.hooks_submitted.len(),
            "Push recorded"
        );
        Ok(report)
    }

    /// Pusher block of the push payload. Blank apart from the login name
    /// when no account carries that name.
    async fn pusher_author(&self, pusher_name: &str) -> PayloadAuthor {
        match self.db.get_user_by_name(pusher_name).await {
            Ok(Some(user)) => PayloadAuthor {
                name: user.display_name().to_string(),
                email: user.email.clone(),
                username: pusher_name.to_string(),
            },
            Ok(None) => PayloadAuthor {
                username: pusher_name.to_string(),
                ..PayloadAuthor::default()
            },
            Err(e) => {
                warn!(pusher = pusher_name, error = %e, "Failed to look up pusher");
                PayloadAuthor {
                    username: pusher_name.to_string(),
                    ..PayloadAuthor::default()
                }
            }
        }
    }

    async fn submit(&self, repo: &Repository, payload: WebhookPayload, report: &mut PushReport) {
        let event = payload.event();
        match self.hooks.submit(repo, event, &payload).await {
            Ok(()) => report.hooks_submitted.push(event),
            Err(e) => {
                warn!(repo = %repo.full_name(), %event, error = %e, "Failed to submit webhook");
                report.hook_errors.push(format!("{event}: {e:#}"));
            }
        }
    }
}
