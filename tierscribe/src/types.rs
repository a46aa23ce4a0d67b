use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::ClassifiedError;
use crate::error::{Error, Result};
use crate::video::VideoRef;

/// Which strategy produced (or failed to produce) a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodTag {
    #[serde(rename = "youtube_captions")]
    Captions,
    #[serde(rename = "ytdlp_assemblyai")]
    PrimaryDownload,
    #[serde(rename = "ytdlp_alt_assemblyai")]
    AlternateDownload,
    #[serde(rename = "assemblyai_direct")]
    DirectUrl,
}

impl MethodTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodTag::Captions => "youtube_captions",
            MethodTag::PrimaryDownload => "ytdlp_assemblyai",
            MethodTag::AlternateDownload => "ytdlp_alt_assemblyai",
            MethodTag::DirectUrl => "assemblyai_direct",
        }
    }
}

impl fmt::Display for MethodTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing knobs for one resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OptionsWire")]
pub struct TranscriptOptions {
    pub want_speaker_labels: bool,
    pub expected_speaker_count: Option<u8>,
    pub language_hint: Option<String>,
    pub prefer_diarization: bool,
}

/// Unvalidated form of [`TranscriptOptions`] as it arrives over the wire.
#[derive(Deserialize)]
#[serde(default)]
struct OptionsWire {
    want_speaker_labels: bool,
    expected_speaker_count: Option<u8>,
    language_hint: Option<String>,
    prefer_diarization: bool,
}

impl Default for OptionsWire {
    fn default() -> Self {
        let d = TranscriptOptions::default();
        Self {
            want_speaker_labels: d.want_speaker_labels,
            expected_speaker_count: d.expected_speaker_count,
            language_hint: d.language_hint,
            prefer_diarization: d.prefer_diarization,
        }
    }
}

impl TryFrom<OptionsWire> for TranscriptOptions {
    type Error = Error;

    fn try_from(wire: OptionsWire) -> Result<Self> {
        let mut options = TranscriptOptions::new()
            .speaker_labels(wire.want_speaker_labels)
            .prefer_diarization(wire.prefer_diarization);
        if let Some(n) = wire.expected_speaker_count {
            options = options.expected_speakers(n)?;
        }
        if let Some(lang) = wire.language_hint {
            options = options.language(lang);
        }
        Ok(options)
    }
}

impl Default for TranscriptOptions {
    fn default() -> Self {
        Self {
            want_speaker_labels: true,
            expected_speaker_count: None,
            language_hint: None,
            prefer_diarization: false,
        }
    }
}

impl TranscriptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn speaker_labels(mut self, enabled: bool) -> Self {
        self.want_speaker_labels = enabled;
        self
    }

    /// Expected number of distinct speakers, 1 through 10.
    pub fn expected_speakers(mut self, n: u8) -> Result<Self> {
        self.expected_speaker_count = Some(n);
        self.validate()?;
        Ok(self)
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        let lang = lang.into();
        self.language_hint = if lang.trim().is_empty() {
            None
        } else {
            Some(lang.trim().to_string())
        };
        self
    }

    pub fn prefer_diarization(mut self, enabled: bool) -> Self {
        self.prefer_diarization = enabled;
        self
    }

    /// Re-check invariants on options whose fields were set directly.
    pub fn validate(&self) -> Result<()> {
        match self.expected_speaker_count {
            Some(n) if !(1..=10).contains(&n) => Err(Error::InvalidOption(format!(
                "expected speaker count must be between 1 and 10, got {n}"
            ))),
            _ => Ok(()),
        }
    }
}

/// A validated video plus options. Immutable once resolution starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRequest {
    pub video: VideoRef,
    pub options: TranscriptOptions,
}

impl TranscriptRequest {
    pub fn new(video: VideoRef, options: TranscriptOptions) -> Self {
        Self { video, options }
    }

    /// Normalize raw caller input into a request.
    pub fn parse(input: &str, options: TranscriptOptions) -> Result<Self> {
        let video = VideoRef::parse(input)?;
        options.validate()?;
        Ok(Self::new(video, options))
    }
}

/// One diarized utterance. Times are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub method: MethodTag,
    pub text: String,
    pub utterances: Option<Vec<Utterance>>,
    /// Sorted, unique speaker labels.
    pub speakers: Vec<String>,
    pub confidence: Option<f64>,
    pub audio_duration_seconds: Option<u64>,
    pub language: Option<String>,
    pub transcript_id: String,
}

impl TranscriptResult {
    /// Speaker-prefixed lines when diarized, plain text otherwise.
    pub fn render_text(&self) -> String {
        match &self.utterances {
            Some(utterances) if !utterances.is_empty() => utterances
                .iter()
                .map(|u| format!("Speaker {}: {}", u.speaker, u.text.trim()))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => self.text.clone(),
        }
    }
}

/// Sorted unique labels from a sequence of utterances.
pub(crate) fn speakers_of(utterances: &[Utterance]) -> Vec<String> {
    let mut speakers: Vec<String> = utterances.iter().map(|u| u.speaker.clone()).collect();
    speakers.sort();
    speakers.dedup();
    speakers
}

/// Display metadata for a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub author: String,
    pub thumbnail: String,
    pub thumbnail_small: Option<String>,
    pub duration_seconds: Option<u64>,
}

impl VideoMetadata {
    /// Stand-in used when the metadata lookup failed for a non-fatal reason.
    pub fn placeholder(video: &VideoRef) -> Self {
        Self {
            video_id: video.id().to_string(),
            title: "Unknown".into(),
            author: "Unknown".into(),
            thumbnail: video.thumbnail_url(),
            thumbnail_small: Some(video.thumbnail_small_url()),
            duration_seconds: None,
        }
    }
}

/// Record of one attempted tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierOutcome {
    pub method: MethodTag,
    pub succeeded: bool,
    pub error: Option<ClassifiedError>,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl TierOutcome {
    pub fn succeeded(method: MethodTag, elapsed: Duration) -> Self {
        Self {
            method,
            succeeded: true,
            error: None,
            elapsed,
        }
    }

    pub fn failed(method: MethodTag, error: ClassifiedError, elapsed: Duration) -> Self {
        Self {
            method,
            succeeded: false,
            error: Some(error),
            elapsed,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub video: VideoRef,
    pub metadata: VideoMetadata,
    pub transcript: TranscriptResult,
    pub outcomes: Vec<TierOutcome>,
}

impl Resolution {
    pub fn method(&self) -> MethodTag {
        self.transcript.method
    }

    /// Transcript duration, else whatever the metadata knew.
    pub fn audio_duration(&self) -> Option<u64> {
        self.transcript
            .audio_duration_seconds
            .or(self.metadata.duration_seconds)
    }

    /// Format as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Format as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
