// Activity records: "who did what to which repository".
//
// Every kind of event shares one flat row shape. Callers never build the
// row by hand; they describe the event with `ActivityEvent` and
// `Action::record` fills in the discriminant and the content encoding.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::commits::PushCommits;
use crate::db::models::{Issue, Repository, User};

/// Operation discriminant, stored as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    CreateRepo,
    RenameRepo,
    StarRepo,
    FollowRepo,
    CommitRepo,
    CreateIssue,
    CreatePullRequest,
    TransferRepo,
    PushTag,
    CommentIssue,
    MergePullRequest,
}

impl ActionType {
    pub fn as_i64(self) -> i64 {
        match self {
            ActionType::CreateRepo => 1,
            ActionType::RenameRepo => 2,
            ActionType::StarRepo => 3,
            ActionType::FollowRepo => 4,
            ActionType::CommitRepo => 5,
            ActionType::CreateIssue => 6,
            ActionType::CreatePullRequest => 7,
            ActionType::TransferRepo => 8,
            ActionType::PushTag => 9,
            ActionType::CommentIssue => 10,
            ActionType::MergePullRequest => 11,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        Some(match v {
            1 => ActionType::CreateRepo,
            2 => ActionType::RenameRepo,
            3 => ActionType::StarRepo,
            4 => ActionType::FollowRepo,
            5 => ActionType::CommitRepo,
            6 => ActionType::CreateIssue,
            7 => ActionType::CreatePullRequest,
            8 => ActionType::TransferRepo,
            9 => ActionType::PushTag,
            10 => ActionType::CommentIssue,
            11 => ActionType::MergePullRequest,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateRepo => "create-repo",
            ActionType::RenameRepo => "rename-repo",
            ActionType::StarRepo => "star",
            ActionType::FollowRepo => "follow",
            ActionType::CommitRepo => "commit-push",
            ActionType::CreateIssue => "create-issue",
            ActionType::CreatePullRequest => "create-pull-request",
            ActionType::TransferRepo => "transfer-repo",
            ActionType::PushTag => "push-tag",
            ActionType::CommentIssue => "comment-issue",
            ActionType::MergePullRequest => "merge-pull-request",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The event being recorded, one variant per operation type.
#[derive(Debug, Clone, Copy)]
pub enum ActivityEvent<'a> {
    CreateRepo,
    RenameRepo { old_name: &'a str },
    StarRepo,
    FollowRepo,
    CommitRepo { ref_name: &'a str, commits: &'a PushCommits },
    PushTag { ref_name: &'a str, commits: &'a PushCommits },
    CreateIssue { issue: &'a Issue },
    CreatePullRequest { pull: &'a Issue },
    /// Only the first line of the comment is kept.
    CommentIssue { issue: &'a Issue, comment: &'a str },
    /// `repo` already belongs to `new_owner_name` when this is recorded.
    TransferRepo { old_owner_name: &'a str, new_owner_name: &'a str },
    MergePullRequest { pull: &'a Issue },
}

impl ActivityEvent<'_> {
    pub fn op_type(&self) -> ActionType {
        match self {
            ActivityEvent::CreateRepo => ActionType::CreateRepo,
            ActivityEvent::RenameRepo { .. } => ActionType::RenameRepo,
            ActivityEvent::StarRepo => ActionType::StarRepo,
            ActivityEvent::FollowRepo => ActionType::FollowRepo,
            ActivityEvent::CommitRepo { .. } => ActionType::CommitRepo,
            ActivityEvent::PushTag { .. } => ActionType::PushTag,
            ActivityEvent::CreateIssue { .. } => ActionType::CreateIssue,
            ActivityEvent::CreatePullRequest { .. } => ActionType::CreatePullRequest,
            ActivityEvent::CommentIssue { .. } => ActionType::CommentIssue,
            ActivityEvent::TransferRepo { .. } => ActionType::TransferRepo,
            ActivityEvent::MergePullRequest { .. } => ActionType::MergePullRequest,
        }
    }
}

/// Identity of whoever performed the action.
///
/// For pushes this is the git-level name and email reported by the hook,
/// which may differ from the account's profile.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub id: i64,
    pub name: &'a str,
    pub email: &'a str,
}

impl<'a> From<&'a User> for Actor<'a> {
    fn from(u: &'a User) -> Self {
        Actor {
            id: u.id,
            name: &u.name,
            email: &u.email,
        }
    }
}

/// One feed row. Never updated once inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    /// Whose feed this row appears in.
    pub user_id: i64,
    pub op_type: ActionType,
    pub act_user_id: i64,
    pub act_user_name: String,
    pub act_email: String,
    pub repo_id: i64,
    pub repo_user_name: String,
    pub repo_name: String,
    pub ref_name: String,
    /// Repository visibility when the action happened.
    pub is_private: bool,
    pub content: String,
    pub created: String,
}

impl Action {
    /// Snapshot an event as an unsaved action addressed to the actor.
    /// Fan-out assigns ids and recipients.
    pub fn record(actor: Actor<'_>, repo: &Repository, event: ActivityEvent<'_>) -> Result<Self> {
        let mut repo_user_name = repo.owner_name.clone();
        let mut ref_name = String::new();

        let content = match event {
            ActivityEvent::CreateRepo | ActivityEvent::StarRepo | ActivityEvent::FollowRepo => {
                String::new()
            }
            ActivityEvent::RenameRepo { old_name } => old_name.to_string(),
            ActivityEvent::CommitRepo { ref_name: r, commits }
            | ActivityEvent::PushTag { ref_name: r, commits } => {
                ref_name = r.to_string();
                serde_json::to_string(commits).context("Failed to serialize push commits")?
            }
            ActivityEvent::CreateIssue { issue: i }
            | ActivityEvent::CreatePullRequest { pull: i }
            | ActivityEvent::MergePullRequest { pull: i } => format!("{}|{}", i.index, i.name),
            ActivityEvent::CommentIssue { issue, comment } => {
                format!("{}|{}", issue.index, comment.lines().next().unwrap_or(""))
            }
            ActivityEvent::TransferRepo {
                old_owner_name,
                new_owner_name,
            } => {
                repo_user_name = new_owner_name.to_string();
                format!("{}/{}", old_owner_name.to_lowercase(), repo.lower_name)
            }
        };

        Ok(Self {
            id: 0,
            user_id: actor.id,
            op_type: event.op_type(),
            act_user_id: actor.id,
            act_user_name: actor.name.to_string(),
            act_email: actor.email.to_string(),
            repo_id: repo.id,
            repo_user_name,
            repo_name: repo.name.clone(),
            ref_name,
            is_private: repo.is_private,
            content,
            created: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        })
    }

    /// `owner/name` of the repository as it was when recorded.
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.repo_user_name, self.repo_name)
    }

    /// Split `index|title` content of issue and pull request actions.
    pub fn issue_infos(&self) -> Option<(i64, &str)> {
        let (index, title) = self.content.split_once('|')?;
        Some((index.parse().ok()?, title))
    }

    /// Decode the commit list of commit-push and push-tag actions.
    pub fn push_commits(&self) -> Result<PushCommits> {
        serde_json::from_str(&self.content)
            .with_context(|| format!("Action {} does not carry a commit list", self.id))
    }
}
