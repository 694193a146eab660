// Event pipelines: git pushes and the other repository events that end up
// in activity feeds.

pub mod push;
pub mod repo_events;

pub use push::{PushEvent, PushPipeline, PushReport};
