// Commit message keyword matching.
//
// Three rule sets: plain references (any token), close keywords and reopen
// keywords. Close/reopen rules match a keyword followed by a single space
// and one whitespace-free token; that token is the candidate reference.
// Matching is pure: resolving candidates to issues happens elsewhere.

use anyhow::{Context, Result};
use regex_lite::Regex;

/// Same vocabulary GitHub uses for closing issues from commit messages.
pub const DEFAULT_CLOSE_KEYWORDS: &[&str] = &[
    "close", "closes", "closed", "fix", "fixes", "fixed", "resolve", "resolves", "resolved",
];

pub const DEFAULT_REOPEN_KEYWORDS: &[&str] = &["reopen", "reopens", "reopened"];

/// Every token at the start of the message or after a space.
const REFERENCE_PATTERN: &str = r"(?:^| )\S+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    Reference,
    Close,
    Reopen,
}

/// The compiled rule sets. Build once at startup and pass around.
#[derive(Debug, Clone)]
pub struct KeywordPatterns {
    reference: Regex,
    close: Regex,
    reopen: Regex,
}

impl KeywordPatterns {
    /// Compile patterns for custom close and reopen vocabularies.
    pub fn new<S: AsRef<str>>(close_words: &[S], reopen_words: &[S]) -> Result<Self> {
        Ok(Self {
            reference: Regex::new(REFERENCE_PATTERN).context("Invalid reference pattern")?,
            close: compile_keywords(close_words).context("Invalid close keyword list")?,
            reopen: compile_keywords(reopen_words).context("Invalid reopen keyword list")?,
        })
    }

    /// The default vocabularies.
    pub fn standard() -> Result<Self> {
        Self::new(DEFAULT_CLOSE_KEYWORDS, DEFAULT_REOPEN_KEYWORDS)
    }

    fn pattern(&self, kind: KeywordKind) -> &Regex {
        match kind {
            KeywordKind::Reference => &self.reference,
            KeywordKind::Close => &self.close,
            KeywordKind::Reopen => &self.reopen,
        }
    }

    /// Candidate references in a message for the given rule set, in the
    /// order they appear. Duplicates are kept.
    pub fn find(&self, kind: KeywordKind, message: &str) -> Vec<String> {
        self.pattern(kind)
            .find_iter(message)
            .filter_map(|m| candidate_token(m.as_str()))
            .collect()
    }
}

fn compile_keywords<S: AsRef<str>>(words: &[S]) -> Result<Regex> {
    if words.is_empty() {
        anyhow::bail!("keyword list is empty");
    }
    let alternation = words
        .iter()
        .map(|w| regex_lite::escape(w.as_ref()))
        .collect::<Vec<_>>()
        .join("|");
    Ok(Regex::new(&format!(r"(?i)(?:{alternation}) \S+"))?)
}

/// Take the text after the first space and drop trailing non-digits:
/// "fixes #12." -> "#12". Returns None when nothing is left.
fn candidate_token(matched: &str) -> Option<String> {
    let token = match matched.find(' ') {
        Some(i) => &matched[i + 1..],
        None => matched,
    };
    let token = token.trim_end_matches(|c: char| !c.is_ascii_digit());
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
