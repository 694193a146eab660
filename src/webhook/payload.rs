// Webhook payload shapes and builders.
//
// Builders are pure: everything they need (resolved pusher, commit author
// lookups, settings) is passed in, so they can be tested without a store.

use serde::{Deserialize, Serialize};

use super::HookEvent;
use crate::activity::commits::PushCommits;
use crate::config::Settings;
use crate::db::models::{Repository, User};

/// The account that triggered the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadUser {
    pub id: i64,
    pub username: String,
    pub avatar_url: String,
}

impl PayloadUser {
    pub fn from_user(user: &User, settings: &Settings) -> Self {
        Self {
            id: user.id,
            username: user.name.clone(),
            avatar_url: user.avatar_link(settings),
        }
    }
}

/// A commit author, pusher or repository owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadAuthor {
    pub name: String,
    pub email: String,
    /// Login name, empty when the email matches no account.
    pub username: String,
}

impl PayloadAuthor {
    pub fn from_user(user: &User) -> Self {
        Self {
            name: user.display_name().to_string(),
            email: user.email.clone(),
            username: user.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadCommit {
    pub id: String,
    pub message: String,
    pub url: String,
    pub author: PayloadAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRepo {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub description: String,
    pub website: String,
    pub watchers: i64,
    pub owner: PayloadAuthor,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub before: String,
    pub after: String,
    pub compare_url: String,
    pub commits: Vec<PayloadCommit>,
    pub repository: PayloadRepo,
    pub pusher: PayloadAuthor,
    pub sender: PayloadUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePayload {
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// `branch` or `tag`
    pub ref_type: String,
    pub repository: PayloadRepo,
    pub sender: PayloadUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Push(PushPayload),
    Create(CreatePayload),
}

impl WebhookPayload {
    pub fn event(&self) -> HookEvent {
        match self {
            WebhookPayload::Push(_) => HookEvent::Push,
            WebhookPayload::Create(_) => HookEvent::Create,
        }
    }
}

/// Repository block shared by every payload.
pub fn compose_repo(repo: &Repository, owner: &User, settings: &Settings) -> PayloadRepo {
    PayloadRepo {
        id: repo.id,
        name: repo.name.clone(),
        url: repo.html_url(settings),
        description: repo.description.clone(),
        website: repo.website.clone(),
        watchers: repo.num_watches,
        owner: PayloadAuthor::from_user(owner),
        private: repo.is_private,
    }
}

/// Everything a push payload needs beyond the commits themselves.
pub struct PushContext<'a> {
    pub ref_full_name: &'a str,
    pub old_commit_id: &'a str,
    pub new_commit_id: &'a str,
    pub repo: PayloadRepo,
    pub pusher: PayloadAuthor,
    pub sender: PayloadUser,
}

/// Build the push payload. Commit authors must already be resolved on
/// `commits`; unresolved ones get an empty username.
pub fn build_push_payload(
    ctx: PushContext<'_>,
    commits: &PushCommits,
    repo: &Repository,
    settings: &Settings,
) -> PushPayload {
    let html_url = repo.html_url(settings);
    let payload_commits = commits
        .commits
        .iter()
        .map(|c| PayloadCommit {
            id: c.sha1.clone(),
            message: c.message.clone(),
            url: format!("{}/commit/{}", html_url, c.sha1),
            author: PayloadAuthor {
                name: c.author_name.clone(),
                email: c.author_email.clone(),
                username: commits
                    .author(&c.author_email)
                    .and_then(|a| a.user_name.clone())
                    .unwrap_or_default(),
            },
        })
        .collect();

    let compare_url = if commits.compare_url.is_empty() {
        String::new()
    } else {
        format!("{}{}", settings.app_url, commits.compare_url)
    };

    PushPayload {
        ref_name: ctx.ref_full_name.to_string(),
        before: ctx.old_commit_id.to_string(),
        after: ctx.new_commit_id.to_string(),
        compare_url,
        commits: payload_commits,
        repository: ctx.repo,
        pusher: ctx.pusher,
        sender: ctx.sender,
    }
}

/// Build the payload announcing a new branch or tag. `ref_name` is the
/// short name.
pub fn build_create_payload(
    ref_name: &str,
    ref_type: &str,
    repo: PayloadRepo,
    sender: PayloadUser,
) -> CreatePayload {
    CreatePayload {
        ref_name: ref_name.to_string(),
        ref_type: ref_type.to_string(),
        repository: repo,
        sender,
    }
}
