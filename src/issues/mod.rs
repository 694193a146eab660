// Commit message driven issue linking: keyword matching, reference
// resolution and the close/reopen updater.

pub mod keywords;
pub mod reference;
pub mod updater;

pub use keywords::{KeywordKind, KeywordPatterns};
pub use updater::{IssueUpdateSummary, IssueUpdater};
