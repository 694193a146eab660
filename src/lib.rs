// pushfeed: activity feeds, commit-driven issue updates and webhook
// payloads for git pushes
//
// This is the library root. Each module corresponds to one stage of the
// push pipeline or to the store it runs against.

pub mod activity;
pub mod avatar;
pub mod config;
pub mod db;
pub mod issues;
pub mod output;
pub mod pipeline;
pub mod status;
pub mod webhook;
