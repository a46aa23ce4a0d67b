//! Acquisition strategies and the collaborators they drive.
//!
//! A strategy is one self-contained way of getting a transcript. The set is closed:
//! captions lookup, download-then-transcribe (primary and alternate downloader) and
//! direct URL transcription. Each variant owns its collaborators behind trait
//! objects so the engine can be wired with real tools or with scripted fakes.

mod direct;
mod download;
mod lookup;


use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use direct::DirectTranscribe;
pub use download::DownloadTranscribe;
pub use lookup::CaptionLookup;

use crate::classify::ClassifiedError;
use crate::config::EngineConfig;
use crate::credentials::CredentialStatus;
use crate::error::Error;
use crate::proxy::{ProxyLadder, ProxyOption};
use crate::types::{MethodTag, TranscriptOptions, TranscriptRequest, TranscriptResult, Utterance};
use crate::video::VideoRef;

/// One timed piece of a caption track. Times are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSnippet {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language: String,
    pub auto_generated: bool,
    pub snippets: Vec<CaptionSnippet>,
}

/// Published captions for a video.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Fetch the first available track among `languages`, in preference order.
    async fn fetch(
        &self,
        video: &VideoRef,
        languages: &[String],
        egress: &ProxyOption,
        cookies: Option<&Path>,
    ) -> crate::Result<CaptionTrack>;
}

/// Everything a downloader needs for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub video: &'a VideoRef,
    pub work_dir: &'a Path,
    pub egress: &'a ProxyOption,
    pub cookies: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedAudio {
    pub path: PathBuf,
    pub duration_seconds: Option<u64>,
    pub title: Option<String>,
}

/// Fetches a video's audio track into a local file.
#[async_trait]
pub trait AudioDownloader: Send + Sync {
    async fn download(&self, request: DownloadRequest<'_>) -> crate::Result<DownloadedAudio>;
}

/// Where speech-to-text reads audio from.
#[derive(Debug, Clone, Copy)]
pub enum AudioSource<'a> {
    File(&'a Path),
    Url(&'a str),
}

/// Raw speech-to-text output before it is tagged with a method.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechTranscript {
    pub id: String,
    pub text: String,
    pub utterances: Option<Vec<Utterance>>,
    pub confidence: Option<f64>,
    pub audio_duration_seconds: Option<u64>,
    pub language: Option<String>,
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        source: AudioSource<'_>,
        options: &TranscriptOptions,
    ) -> crate::Result<SpeechTranscript>;
}

/// Cuts the leading part of an audio file without re-encoding.
#[async_trait]
pub trait AudioTrimmer: Send + Sync {
    async fn trim(&self, source: &Path, dest: &Path, seconds: u64) -> crate::Result<()>;
}

/// Per-resolution inputs shared by every strategy attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    pub config: &'a EngineConfig,
    pub ladder: &'a ProxyLadder,
    pub work_dir: &'a Path,
    pub credentials: &'a CredentialStatus,
}

#[derive(Clone)]
pub enum Strategy {
    CaptionLookup(CaptionLookup),
    DownloadTranscribe(DownloadTranscribe),
    DirectTranscribe(DirectTranscribe),
}

impl Strategy {
    pub fn tag(&self) -> MethodTag {
        match self {
            Strategy::CaptionLookup(_) => MethodTag::Captions,
            Strategy::DownloadTranscribe(s) => s.tag(),
            Strategy::DirectTranscribe(_) => MethodTag::DirectUrl,
        }
    }

    /// Whether this strategy can produce speaker labels.
    pub fn supports_diarization(&self) -> bool {
        !matches!(self, Strategy::CaptionLookup(_))
    }

    pub async fn attempt(
        &self,
        request: &TranscriptRequest,
        ctx: AttemptContext<'_>,
    ) -> Result<TranscriptResult, ClassifiedError> {
        match self {
            Strategy::CaptionLookup(s) => s.attempt(request, ctx).await,
            Strategy::DownloadTranscribe(s) => s.attempt(request, ctx).await,
            Strategy::DirectTranscribe(s) => s.attempt(request, ctx).await,
        }
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Strategy").field(&self.tag()).finish()
    }
}

/// Await a collaborator call under a deadline, classifying whatever comes back.
pub(crate) async fn with_timeout<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = crate::Result<T>>,
) -> Result<T, ClassifiedError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.classify()),
        Err(_) => Err(Error::Timeout {
            operation,
            seconds: limit.as_secs(),
        }
        .classify()),
    }
}

/// Tag raw speech-to-text output with the strategy that produced it.
pub(crate) fn tagged(method: MethodTag, transcript: SpeechTranscript) -> TranscriptResult {
    let speakers = transcript
        .utterances
        .as_deref()
        .map(crate::types::speakers_of)
        .unwrap_or_default();
    TranscriptResult {
        method,
        text: transcript.text,
        utterances: transcript.utterances,
        speakers,
        confidence: transcript.confidence,
        audio_duration_seconds: transcript.audio_duration_seconds,
        language: transcript.language,
        transcript_id: transcript.id,
    }
}
