use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

static URL_FORMS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(?:https?://)?(?:www\.|m\.)?youtube\.com/watch\?v=([A-Za-z0-9_-]{11})",
        r"^(?:https?://)?(?:www\.)?youtu\.be/([A-Za-z0-9_-]{11})",
        r"^(?:https?://)?(?:www\.)?youtube\.com/embed/([A-Za-z0-9_-]{11})",
        r"^(?:https?://)?(?:www\.)?youtube\.com/v/([A-Za-z0-9_-]{11})",
        r"^(?:https?://)?(?:www\.)?youtube\.com/shorts/([A-Za-z0-9_-]{11})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static QUERY_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"v=([A-Za-z0-9_-]{11})").unwrap());

/// A canonical YouTube video id.
///
/// Every accepted spelling of the same video (watch URL, short link, embed, shorts,
/// bare id) parses to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoRef(String);

impl VideoRef {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if BARE_ID.is_match(trimmed) {
            return Ok(Self(trimmed.to_string()));
        }

        for form in URL_FORMS.iter() {
            if let Some(caps) = form.captures(trimmed) {
                return Ok(Self(caps[1].to_string()));
            }
        }

        if trimmed.contains("v=") {
            if let Some(caps) = QUERY_PARAM.captures(trimmed) {
                return Ok(Self(caps[1].to_string()));
            }
        }

        Err(Error::InvalidVideo(trimmed.to_string()))
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// The normalized URL handed to downloaders and direct transcription.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }

    pub fn thumbnail_url(&self) -> String {
        format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", self.0)
    }

    pub fn thumbnail_small_url(&self) -> String {
        format!("https://img.youtube.com/vi/{}/hqdefault.jpg", self.0)
    }
}

impl fmt::Display for VideoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VideoRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VideoRef {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<VideoRef> for String {
    fn from(v: VideoRef) -> Self {
        v.0
    }
}
