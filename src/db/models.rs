// Data models — Rust structs that map to database rows.
//
// These are the entities the pipeline reads and mutates through the
// Database trait. The activity record itself lives in activity::action
// because it is the pipeline's own output rather than a collaborator row.

use serde::{Deserialize, Serialize};

use crate::avatar;
use crate::config::Settings;

/// A user account (people only; organizations are not modelled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub lower_name: String,
    pub full_name: String,
    pub email: String,
    /// Email used for hashed avatars when it differs from the login email.
    pub avatar_email: String,
    pub use_custom_avatar: bool,
}

impl User {
    /// Full name when set, otherwise the login name.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.name
        } else {
            &self.full_name
        }
    }

    /// Absolute avatar URL for this account.
    pub fn avatar_link(&self, settings: &Settings) -> String {
        if self.use_custom_avatar {
            return format!("{}avatars/{}", settings.app_url, self.id);
        }
        let email = if self.avatar_email.is_empty() {
            &self.email
        } else {
            &self.avatar_email
        };
        avatar::hashed_link(&settings.avatar_source, email)
    }
}

/// A repository, loaded together with its owner's login name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub owner_id: i64,
    pub owner_name: String,
    pub lower_name: String,
    pub name: String,
    pub description: String,
    pub website: String,
    pub is_private: bool,
    /// True until the first push lands.
    pub is_bare: bool,
    pub num_watches: i64,
    pub num_issues: i64,
    pub num_closed_issues: i64,
    pub updated: String,
}

impl Repository {
    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner_name, self.name)
    }

    /// Absolute link used in outbound payloads.
    pub fn html_url(&self, settings: &Settings) -> String {
        format!("{}{}", settings.app_url, self.full_name())
    }
}

/// An issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub repo_id: i64,
    /// Per-repository number shown as `#index`.
    pub index: i64,
    pub poster_id: i64,
    pub name: String,
    pub content: String,
    pub is_pull: bool,
    pub is_closed: bool,
    pub num_comments: i64,
}

/// Comment kinds. Stored as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentType {
    Plain,
    Reopen,
    Close,
    /// A commit message mentioned the issue.
    CommitRef,
}

impl CommentType {
    pub fn as_i64(self) -> i64 {
        match self {
            CommentType::Plain => 0,
            CommentType::Reopen => 1,
            CommentType::Close => 2,
            CommentType::CommitRef => 4,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(CommentType::Plain),
            1 => Some(CommentType::Reopen),
            2 => Some(CommentType::Close),
            4 => Some(CommentType::CommitRef),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub kind: CommentType,
    pub poster_id: i64,
    pub issue_id: i64,
    /// Sha of the commit that produced this comment, empty for plain comments.
    pub commit_sha: String,
    pub content: String,
    pub created: String,
}

/// A queued outbound webhook. Delivery happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookTask {
    pub id: i64,
    pub repo_id: i64,
    pub event: String,
    pub payload: String,
    pub created: String,
}

/// Fields for a new account.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub full_name: String,
    pub avatar_email: String,
    pub use_custom_avatar: bool,
}

impl NewUser {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            ..Self::default()
        }
    }
}

/// Fields for a new repository.
#[derive(Debug, Clone, Default)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub website: String,
    pub is_private: bool,
}

impl NewRepository {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }
}

/// Fields for a new issue or pull request.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub title: String,
    pub content: String,
    pub is_pull: bool,
}

impl NewIssue {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}
