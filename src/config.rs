use std::env;

use anyhow::{Context, Result};

use crate::issues::keywords::{DEFAULT_CLOSE_KEYWORDS, DEFAULT_REOPEN_KEYWORDS};

pub const DEFAULT_APP_URL: &str = "http://localhost:3000/";
pub const DEFAULT_AVATAR_SOURCE: &str = "https://secure.gravatar.com/avatar/";
pub const DEFAULT_FEED_MAX_COMMIT_NUM: usize = 5;

/// The values the pipeline consumes. Built from the environment by
/// `Config::load`, or directly in tests.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Absolute external URL, always ending in `/`.
    pub app_url: String,
    /// Path prefix of `app_url` without the trailing slash ("" when served at root).
    pub app_sub_url: String,
    /// Maximum number of commits kept on a single feed entry.
    pub feed_max_commit_num: usize,
    /// Base URL for hashed avatar links.
    pub avatar_source: String,
    pub close_keywords: Vec<String>,
    pub reopen_keywords: Vec<String>,
}

impl Settings {
    /// Build settings for the given external URL, keeping every other
    /// value at its default.
    pub fn with_app_url(app_url: &str) -> Self {
        let app_url = normalize_app_url(app_url);
        let app_sub_url = sub_url_of(&app_url);
        Self {
            app_url,
            app_sub_url,
            ..Self::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_url: DEFAULT_APP_URL.to_string(),
            app_sub_url: String::new(),
            feed_max_commit_num: DEFAULT_FEED_MAX_COMMIT_NUM,
            avatar_source: DEFAULT_AVATAR_SOURCE.to_string(),
            close_keywords: DEFAULT_CLOSE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            reopen_keywords: DEFAULT_REOPEN_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy.
pub struct Config {
    pub db_path: String,
    pub settings: Settings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default, so an empty environment gives a working
    /// local setup.
    pub fn load() -> Result<Self> {
        let mut settings =
            Settings::with_app_url(&env::var("APP_URL").unwrap_or_else(|_| DEFAULT_APP_URL.into()));

        if let Ok(raw) = env::var("FEED_MAX_COMMIT_NUM") {
            settings.feed_max_commit_num = raw
                .trim()
                .parse()
                .with_context(|| format!("FEED_MAX_COMMIT_NUM is not a number: {raw}"))?;
        }
        if let Ok(source) = env::var("AVATAR_SOURCE") {
            settings.avatar_source = source;
        }
        if let Ok(raw) = env::var("ISSUE_CLOSE_KEYWORDS") {
            settings.close_keywords = split_keywords(&raw);
        }
        if let Ok(raw) = env::var("ISSUE_REOPEN_KEYWORDS") {
            settings.reopen_keywords = split_keywords(&raw);
        }

        if settings.close_keywords.is_empty() || settings.reopen_keywords.is_empty() {
            anyhow::bail!(
                "ISSUE_CLOSE_KEYWORDS and ISSUE_REOPEN_KEYWORDS must each name at least one keyword"
            );
        }

        Ok(Self {
            db_path: env::var("PUSHFEED_DB_PATH").unwrap_or_else(|_| "./pushfeed.db".to_string()),
            settings,
        })
    }
}

fn normalize_app_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// "https://git.example.com/code/" -> "/code"
fn sub_url_of(app_url: &str) -> String {
    let after_scheme = match app_url.find("://") {
        Some(i) => &app_url[i + 3..],
        None => app_url,
    };
    match after_scheme.find('/') {
        Some(i) => after_scheme[i..].trim_end_matches('/').to_string(),
        None => String::new(),
    }
}

fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
