// Outbound webhook events.
//
// The pipeline only builds payloads and hands them to a `WebhookSink`.
// Delivery to remote endpoints (HTTP, retries, signing) happens elsewhere;
// the bundled SQLite store implements the sink by queueing hook tasks.

pub mod payload;

use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::Repository;

pub use payload::{CreatePayload, PushPayload, WebhookPayload};

/// Which hook a payload is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    Push,
    Create,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Push => "push",
            HookEvent::Create => "create",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts payloads for a repository's configured webhooks.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn submit(&self, repo: &Repository, event: HookEvent, payload: &WebhookPayload) -> Result<()>;
}
