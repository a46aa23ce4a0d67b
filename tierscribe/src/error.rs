use std::fmt;

use crate::classify::{classify, ClassifiedError, ErrorKind};
use crate::types::TierOutcome;

/// All errors that can occur in tierscribe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid YouTube URL or video id: \"{0}\"")]
    InvalidVideo(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// The target itself was rejected (missing, private) before the ladder could finish.
    #[error("{0}")]
    Rejected(ClassifiedError),

    #[error("{0}")]
    NoCaptionsAvailable(Box<Exhausted>),

    /// The full transcription failed after a partial result had already been delivered.
    #[error("transcription failed: {0}")]
    TranscriptionFailed(ClassifiedError),

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[cfg(feature = "download")]
    #[error("download error: {0}")]
    Download(String),

    #[cfg(feature = "download")]
    #[error("yt-dlp not found — install with: pip install yt-dlp")]
    YtDlpNotFound,

    #[cfg(feature = "download")]
    #[error("ffmpeg error: {0}")]
    Ffmpeg(String),

    #[error("speech-to-text error: {0}")]
    SpeechToText(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Normalized view of this error for retry and ladder decisions.
    pub fn classify(&self) -> ClassifiedError {
        match self {
            Error::InvalidVideo(_) => ClassifiedError::new(ErrorKind::NotFound, self.to_string()),
            Error::InvalidOption(_) => ClassifiedError::new(ErrorKind::Fatal, self.to_string()),
            Error::Rejected(c) | Error::TranscriptionFailed(c) => c.clone(),
            Error::Timeout { .. } => ClassifiedError::new(ErrorKind::Transient, self.to_string()),
            #[cfg(feature = "download")]
            Error::YtDlpNotFound => ClassifiedError::new(ErrorKind::Fatal, self.to_string()),
            Error::Http(e) if e.is_timeout() || e.is_connect() => {
                ClassifiedError::new(ErrorKind::Transient, self.to_string())
            }
            _ => classify(&self.to_string()),
        }
    }

    /// The aggregate failure, if every tier was exhausted.
    pub fn exhausted(&self) -> Option<&Exhausted> {
        match self {
            Error::NoCaptionsAvailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClassifiedError> for Error {
    fn from(err: ClassifiedError) -> Self {
        Error::Rejected(err)
    }
}

/// Aggregate failure raised once the ladder has nothing left to try.
#[derive(Debug, Clone)]
pub struct Exhausted {
    pub video_id: String,
    pub outcomes: Vec<TierOutcome>,
    pub recommendations: Vec<String>,
}

impl Exhausted {
    /// `"{tag}: {message}"` for every failed tier, joined by "; ".
    pub fn summary(&self) -> String {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {}", o.method, e.message)))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// The classified kind that ended the ladder, when it was cut short.
    pub fn terminal_kind(&self) -> Option<ErrorKind> {
        self.outcomes
            .last()
            .and_then(|o| o.error.as_ref())
            .map(|e| e.kind)
            .filter(|k| k.is_terminal())
    }
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not get transcript for video {}: {}",
            self.video_id,
            self.summary()
        )?;
        if !self.recommendations.is_empty() {
            write!(f, " [recommendations: {}]", self.recommendations.join("; "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::MethodTag;

    #[test]
    fn test_error_display_invalid_video() {
        let e = Error::InvalidVideo("nope".into());
        assert!(e.to_string().contains("\"nope\""));
        assert_eq!(e.classify().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_error_display_timeout() {
        let e = Error::Timeout {
            operation: "audio download",
            seconds: 120,
        };
        assert_eq!(e.to_string(), "audio download timed out after 120s");
        let c = e.classify();
        assert_eq!(c.kind, ErrorKind::Transient);
        assert!(c.retryable);
    }

    #[test]
    fn test_rejected_keeps_classification() {
        let c = ClassifiedError::new(ErrorKind::Unavailable, "Video is private: x");
        let e: Error = c.clone().into();
        assert_eq!(e.classify(), c);
        assert_eq!(e.to_string(), "Video is private: x");
    }

    #[test]
    fn test_speech_to_text_error_is_classified_by_text() {
        let e = Error::SpeechToText("HTTP 503 from upstream".into());
        assert_eq!(e.classify().kind, ErrorKind::Transient);
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("file missing"));
    }

    #[test]
    fn test_exhausted_display_lists_tiers_and_recommendations() {
        let exhausted = Exhausted {
            video_id: "abc12345678".into(),
            outcomes: vec![
                TierOutcome::failed(
                    MethodTag::Captions,
                    ClassifiedError::new(ErrorKind::Blocked, "sign in to confirm"),
                    Duration::from_millis(5),
                ),
                TierOutcome::failed(
                    MethodTag::PrimaryDownload,
                    ClassifiedError::new(ErrorKind::Unknown, "weird"),
                    Duration::from_millis(5),
                ),
            ],
            recommendations: vec!["rotate egress".into()],
        };
        let msg = Error::NoCaptionsAvailable(Box::new(exhausted)).to_string();
        assert!(msg.starts_with("could not get transcript for video abc12345678"));
        assert!(msg.contains("youtube_captions: sign in to confirm; ytdlp_assemblyai: weird"));
        assert!(msg.ends_with("[recommendations: rotate egress]"));
    }
}
