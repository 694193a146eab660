// Activity feed: the action record, the commit batch it carries, and the
// fan-out that puts one copy in every interested user's feed.

pub mod action;
pub mod commits;
pub mod feed;

pub use action::{Action, ActionType, ActivityEvent, Actor};
pub use commits::{PushCommit, PushCommits};
