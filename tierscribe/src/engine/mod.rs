//! The resolution engine: fast path, strategy ladder and aggregate failure.

mod progressive;
mod workdir;


use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};

pub use progressive::{Phase, ProgressEvent};

use crate::classify::ClassifiedError;
use crate::config::EngineConfig;
use crate::credentials::CredentialStatus;
use crate::error::{Error, Exhausted, Result};
use crate::metadata::MetadataFetcher;
use crate::proxy::ProxyLadder;
use crate::strategy::{AttemptContext, AudioTrimmer, Strategy};
use crate::types::{
    Resolution, TierOutcome, TranscriptOptions, TranscriptRequest, TranscriptResult, VideoMetadata,
};
use progressive::Events;
use workdir::WorkDir;

/// Walks the strategy ladder for one request at a time.
///
/// Cheap to clone; every clone shares the same configuration and collaborators.
#[derive(Clone)]
pub struct ResolutionEngine {
    config: Arc<EngineConfig>,
    ladder: Arc<ProxyLadder>,
    metadata: Arc<dyn MetadataFetcher>,
    tiers: Arc<[Strategy]>,
    trimmer: Arc<dyn AudioTrimmer>,
}

/// How a single tier attempt ended, when it did not produce a transcript.
enum Failure {
    /// Ordinary failure; the ladder decides what happens next.
    Tier(ClassifiedError),
    /// The full transcription failed after a partial had already been delivered.
    AfterPartial(ClassifiedError),
}

impl ResolutionEngine {
    /// The first tier is the fast path, run alongside the metadata lookup.
    pub fn new(
        config: EngineConfig,
        metadata: Arc<dyn MetadataFetcher>,
        tiers: Vec<Strategy>,
        trimmer: Arc<dyn AudioTrimmer>,
    ) -> Result<Self> {
        if tiers.is_empty() {
            return Err(Error::InvalidOption("at least one strategy is required".into()));
        }
        let ladder = config.proxy_ladder();
        if ladder.is_empty() {
            warn!("no egress option is configured; network strategies will fail");
        }
        Ok(Self {
            ladder: Arc::new(ladder),
            config: Arc::new(config),
            metadata,
            tiers: tiers.into(),
            trimmer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tiers(&self) -> &[Strategy] {
        &self.tiers
    }

    /// Normalize raw input, then resolve. Invalid input fails before any strategy runs.
    pub async fn resolve_input(
        &self,
        input: &str,
        options: TranscriptOptions,
    ) -> Result<Resolution> {
        let request = TranscriptRequest::parse(input, options)?;
        self.resolve(request).await
    }

    pub async fn resolve(&self, request: TranscriptRequest) -> Result<Resolution> {
        self.run(&request, None).await
    }

    async fn run(&self, request: &TranscriptRequest, events: Option<&Events>) -> Result<Resolution> {
        let work_dir = WorkDir::create(&self.config.resolve_temp_root())?;
        let credentials = CredentialStatus::evaluate(&self.config.resolve_cookies_path());
        let ctx = AttemptContext {
            config: &self.config,
            ladder: &self.ladder,
            work_dir: work_dir.path(),
            credentials: &credentials,
        };
        let video = &request.video;
        info!(video = %video, tiers = self.tiers.len(), "resolving transcript");

        let mut outcomes = Vec::new();
        let (fast, slow) = self.tiers.split_at(1);
        let fast = &fast[0];
        let skip_fast = request.options.prefer_diarization && !fast.supports_diarization();
        if skip_fast {
            info!(video = %video, method = %fast.tag(), "skipping fast path: diarization preferred");
        }

        let (metadata, fast_result) = tokio::join!(self.fetch_metadata(request), async {
            if skip_fast {
                None
            } else {
                Some(self.attempt_tier(fast, request, ctx, None, None).await)
            }
        });

        if let Ok(m) = &metadata {
            if let Some(events) = events {
                events.send(ProgressEvent::Metadata(m.clone())).await;
            }
        }

        let fast_error = match fast_result {
            Some((Ok(transcript), outcome)) => {
                outcomes.push(outcome);
                let metadata = metadata.unwrap_or_else(|e| {
                    warn!(video = %video, error = %e, "metadata unavailable, using placeholder");
                    VideoMetadata::placeholder(video)
                });
                return Ok(finish(request, metadata, transcript, outcomes));
            }
            Some((Err(failure), outcome)) => {
                outcomes.push(outcome);
                Some(match failure {
                    Failure::Tier(e) | Failure::AfterPartial(e) => e,
                })
            }
            None => None,
        };

        let metadata = match metadata {
            Ok(m) => m,
            Err(e) if e.is_terminal() => {
                let reported = fast_error.filter(|f| f.is_terminal()).unwrap_or(e);
                warn!(video = %video, kind = %reported.kind, error = %reported, "video rejected");
                return Err(Error::Rejected(reported));
            }
            Err(e) => {
                warn!(video = %video, error = %e, "metadata unavailable, using placeholder");
                VideoMetadata::placeholder(video)
            }
        };

        if fast_error.as_ref().is_some_and(ClassifiedError::is_terminal) {
            return Err(exhausted(request, outcomes));
        }

        for tier in slow {
            let (result, outcome) = self
                .attempt_tier(tier, request, ctx, events, metadata.duration_seconds)
                .await;
            outcomes.push(outcome);
            match result {
                Ok(transcript) => return Ok(finish(request, metadata, transcript, outcomes)),
                Err(Failure::AfterPartial(e)) => return Err(Error::TranscriptionFailed(e)),
                Err(Failure::Tier(e)) if e.is_terminal() => {
                    info!(video = %video, kind = %e.kind, "terminal failure, skipping remaining tiers");
                    break;
                }
                Err(Failure::Tier(_)) => {}
            }
        }

        Err(exhausted(request, outcomes))
    }

    async fn fetch_metadata(
        &self,
        request: &TranscriptRequest,
    ) -> std::result::Result<VideoMetadata, ClassifiedError> {
        let limit = self.config.metadata_timeout;
        match tokio::time::timeout(limit, self.metadata.fetch(&request.video)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: "metadata lookup",
                seconds: limit.as_secs(),
            }
            .classify()),
        }
    }

    /// Run one tier and record how it went. Download tiers race a preview clip
    /// against the full transcription when progress events are wanted.
    async fn attempt_tier(
        &self,
        tier: &Strategy,
        request: &TranscriptRequest,
        ctx: AttemptContext<'_>,
        events: Option<&Events>,
        known_duration: Option<u64>,
    ) -> (std::result::Result<TranscriptResult, Failure>, TierOutcome) {
        let method = tier.tag();
        info!(video = %request.video, %method, "attempting tier");
        let started = Instant::now();

        let result = match (tier, events) {
            (Strategy::DownloadTranscribe(s), Some(events)) => {
                self.race(s, request, ctx, events, known_duration).await
            }
            _ => tier.attempt(request, ctx).await.map_err(Failure::Tier),
        };

        let elapsed = started.elapsed();
        let outcome = match &result {
            Ok(_) => {
                info!(%method, elapsed_ms = elapsed.as_millis() as u64, "tier succeeded");
                TierOutcome::succeeded(method, elapsed)
            }
            Err(Failure::Tier(e) | Failure::AfterPartial(e)) => {
                warn!(%method, kind = %e.kind, error = %e, "tier failed");
                TierOutcome::failed(method, e.clone(), elapsed)
            }
        };
        (result, outcome)
    }
}

fn finish(
    request: &TranscriptRequest,
    mut metadata: VideoMetadata,
    transcript: TranscriptResult,
    outcomes: Vec<TierOutcome>,
) -> Resolution {
    if metadata.duration_seconds.is_none() {
        metadata.duration_seconds = transcript.audio_duration_seconds;
    }
    info!(video = %request.video, method = %transcript.method, "transcript resolved");
    Resolution {
        video: request.video.clone(),
        metadata,
        transcript,
        outcomes,
    }
}

fn exhausted(request: &TranscriptRequest, outcomes: Vec<TierOutcome>) -> Error {
    let mut recommendations: Vec<String> = Vec::new();
    for kind in outcomes
        .iter()
        .filter_map(|o| o.error.as_ref().map(|e| e.kind))
    {
        if let Some(advice) = kind.recommendation() {
            if !recommendations.iter().any(|r| r == advice) {
                recommendations.push(advice.to_string());
            }
        }
    }
    let exhausted = Exhausted {
        video_id: request.video.id().to_string(),
        outcomes,
        recommendations,
    };
    warn!(video = %request.video, summary = %exhausted.summary(), "all tiers exhausted");
    Error::NoCaptionsAvailable(Box::new(exhausted))
}

#[cfg(feature = "download")]
impl ResolutionEngine {
    /// The production ladder: published captions, yt-dlp download with the primary
    /// and alternate player clients, then AssemblyAI pulling the URL itself.
    pub fn standard(config: EngineConfig, assemblyai_key: impl Into<String>) -> Result<Self> {
        use crate::assemblyai::AssemblyAi;
        use crate::audio::FfmpegTrimmer;
        use crate::captions::YtDlpCaptions;
        use crate::metadata::OEmbed;
        use crate::strategy::{CaptionLookup, DirectTranscribe, DownloadTranscribe};
        use crate::ytdlp::YtDlp;

        let stt = Arc::new(AssemblyAi::new(assemblyai_key)?);
        let tiers = vec![
            Strategy::CaptionLookup(CaptionLookup::new(Arc::new(YtDlpCaptions::new()))),
            Strategy::DownloadTranscribe(DownloadTranscribe::primary(
                Arc::new(YtDlp::primary()),
                stt.clone(),
            )),
            Strategy::DownloadTranscribe(DownloadTranscribe::alternate(
                Arc::new(YtDlp::alternate()),
                stt.clone(),
            )),
            Strategy::DirectTranscribe(DirectTranscribe::new(stt)),
        ];
        Self::new(
            config,
            Arc::new(OEmbed::new()?),
            tiers,
            Arc::new(FfmpegTrimmer::new()),
        )
    }
}
