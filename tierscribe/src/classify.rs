//! Heuristic classification of free-text failures.
//!
//! Caption scrapers, yt-dlp and speech-to-text services all report failures as
//! prose. Every decision the engine makes (retry, escalate, advance, give up) keys
//! off the [`ErrorKind`] derived here, so the table below is the single place where
//! message text is interpreted.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// yt-dlp's `[extractor] <video id>:` prefix. IDs are random text and must not be
/// read as keywords.
static EXTRACTOR_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[A-Za-z0-9:_-]+\]\s+[A-Za-z0-9_-]{11}:").unwrap());

/// Semantic kind of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    Blocked,
    RateLimited,
    CredentialsRequired,
    Transient,
    Fatal,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Blocked => "blocked",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CredentialsRequired => "credentials_required",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether a backoff retry of the same operation can help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Transient)
    }

    /// Properties of the target rather than of a strategy: no other tier can succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ErrorKind::NotFound | ErrorKind::Unavailable)
    }

    /// Operator-facing advice attached to the aggregate failure.
    pub fn recommendation(&self) -> Option<&'static str> {
        match self {
            ErrorKind::Blocked => Some(
                "YouTube is blocking automated requests from this egress; \
                 enable a residential proxy or a PO token provider",
            ),
            ErrorKind::CredentialsRequired => {
                Some("refresh the stored cookies with a fresh browser export")
            }
            ErrorKind::RateLimited => Some("rate limited by YouTube; try again later"),
            ErrorKind::Transient => Some("network failures along the way; retry shortly"),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized view over a raw failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

enum Needle {
    /// Matches anywhere in the message.
    Sub(&'static str),
    /// Matches only when not embedded in a longer word ("age" vs "message").
    Word(&'static str),
}

use Needle::{Sub, Word};

/// First matching row wins.
const RULES: &[(ErrorKind, &[Needle])] = &[
    (ErrorKind::Blocked, &[Sub("sign in"), Word("bot")]),
    (
        ErrorKind::RateLimited,
        &[Sub("429"), Sub("rate limit"), Sub("too many")],
    ),
    (ErrorKind::Unavailable, &[Sub("private")]),
    (
        ErrorKind::CredentialsRequired,
        &[Word("age"), Sub("login"), Sub("cookies")],
    ),
    (
        ErrorKind::NotFound,
        &[Sub("not found"), Sub("404"), Sub("unavailable")],
    ),
    (
        ErrorKind::Transient,
        &[
            Sub("timeout"),
            Sub("timed out"),
            Sub("connection"),
            Sub("network"),
            Sub("temporar"),
            Sub("server error"),
            Sub("502"),
            Sub("503"),
            Sub("504"),
        ],
    ),
];

/// Classify a raw failure message. Unmatched messages are `Unknown` and not retried.
pub fn classify(raw: &str) -> ClassifiedError {
    let lower = EXTRACTOR_PREFIX.replace_all(raw, "").to_lowercase();
    let kind = RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| n.matches(&lower)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown);
    ClassifiedError::new(kind, raw)
}

impl Needle {
    fn matches(&self, haystack: &str) -> bool {
        match self {
            Sub(s) => haystack.contains(s),
            Word(w) => contains_word(haystack, w),
        }
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Failures caused by the egress proxy itself (auth, tunnel), not by the target.
pub fn is_proxy_error(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    lower.contains("proxy")
        || lower.contains("tunnel connection failed")
        || format!(" {lower} ").contains(" 407 ")
}

/// yt-dlp extractor failures that usually come from stale cookies or consent pages.
pub fn is_extractor_context_error(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    lower.contains("innertube_context")
        || lower.contains("extractor error")
        || lower.contains("failed to extract")
        || lower.contains("player response")
}

/// Whether the same operation is worth re-attempting through another egress option.
pub fn should_escalate(err: &ClassifiedError) -> bool {
    matches!(
        err.kind,
        ErrorKind::Blocked | ErrorKind::CredentialsRequired
    ) || is_proxy_error(&err.message)
}
