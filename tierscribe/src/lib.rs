//! Video transcript resolution: a YouTube URL or ID in, one structured transcript out.
//!
//! **tierscribe** tries a fixed ladder of acquisition strategies, cheapest first:
//! published captions, audio download + speech-to-text (two yt-dlp client
//! configurations), then letting the speech-to-text service fetch the URL itself.
//! Each strategy escalates through an ordered set of egress proxies, transient
//! failures are retried with backoff, and terminal failures (removed, private)
//! stop the ladder immediately. When every tier fails, the error carries each
//! tier's classified outcome and operator recommendations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tierscribe::{EngineConfig, ResolutionEngine, TranscriptOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> tierscribe::Result<()> {
//! let engine = ResolutionEngine::standard(EngineConfig::from_env()?, "assemblyai-key")?;
//! let resolution = engine
//!     .resolve_input("https://youtu.be/dQw4w9WgXcQ", TranscriptOptions::default())
//!     .await?;
//! println!("[{}] {}", resolution.method(), resolution.transcript.render_text());
//! # Ok(())
//! # }
//! ```
//!
//! For long sources, [`ResolutionEngine::resolve_progressive`] streams a metadata
//! event, a preview transcript of the first minute, and then the full result.

pub mod assemblyai;
#[cfg(feature = "download")]
pub mod audio;
#[cfg(feature = "download")]
pub mod captions;
pub mod classify;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod proxy;
pub mod retry;
pub mod strategy;
pub mod types;
pub mod video;
#[cfg(feature = "download")]
pub mod ytdlp;

pub use assemblyai::AssemblyAi;
#[cfg(feature = "download")]
pub use audio::FfmpegTrimmer;
#[cfg(feature = "download")]
pub use captions::YtDlpCaptions;
pub use classify::{classify, ClassifiedError, ErrorKind};
pub use config::EngineConfig;
pub use credentials::CredentialStatus;
pub use engine::{Phase, ProgressEvent, ResolutionEngine};
pub use error::{Error, Exhausted, Result};
pub use metadata::{MetadataFetcher, OEmbed};
pub use proxy::{ProxyKind, ProxyLadder, ProxyOption};
pub use retry::{BackoffRetrier, RetryPolicy};
pub use strategy::{
    AudioDownloader, AudioTrimmer, CaptionLookup, CaptionSource, DirectTranscribe,
    DownloadTranscribe, SpeechToText, Strategy,
};
pub use types::{
    MethodTag, Resolution, TierOutcome, TranscriptOptions, TranscriptRequest, TranscriptResult,
    Utterance, VideoMetadata,
};
pub use video::VideoRef;
#[cfg(feature = "download")]
pub use ytdlp::YtDlp;
