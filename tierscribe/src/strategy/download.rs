use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::{
    tagged, with_timeout, AttemptContext, AudioDownloader, AudioSource, DownloadRequest,
    DownloadedAudio, SpeechToText,
};
use crate::classify::{is_extractor_context_error, should_escalate, ClassifiedError, ErrorKind};
use crate::config::EngineConfig;
use crate::proxy::{no_egress, ProxyOption};
use crate::retry::BackoffRetrier;
use crate::types::{MethodTag, TranscriptOptions, TranscriptRequest, TranscriptResult};

/// Download the audio locally, then transcribe the file.
#[derive(Clone)]
pub struct DownloadTranscribe {
    tag: MethodTag,
    downloader: Arc<dyn AudioDownloader>,
    stt: Arc<dyn SpeechToText>,
}

impl DownloadTranscribe {
    pub fn primary(downloader: Arc<dyn AudioDownloader>, stt: Arc<dyn SpeechToText>) -> Self {
        Self {
            tag: MethodTag::PrimaryDownload,
            downloader,
            stt,
        }
    }

    /// Same pipeline through a differently configured downloader.
    pub fn alternate(downloader: Arc<dyn AudioDownloader>, stt: Arc<dyn SpeechToText>) -> Self {
        Self {
            tag: MethodTag::AlternateDownload,
            downloader,
            stt,
        }
    }

    pub fn tag(&self) -> MethodTag {
        self.tag
    }

    pub(crate) async fn attempt(
        &self,
        request: &TranscriptRequest,
        ctx: AttemptContext<'_>,
    ) -> Result<TranscriptResult, ClassifiedError> {
        let audio = self.download(request, ctx).await?;
        let mut result = self
            .transcribe_file(&audio.path, &request.options, ctx.config)
            .await?;
        if result.audio_duration_seconds.is_none() {
            result.audio_duration_seconds = audio.duration_seconds;
        }
        Ok(result)
    }

    /// Fetch the audio into the work dir, escalating across egress options.
    pub(crate) async fn download(
        &self,
        request: &TranscriptRequest,
        ctx: AttemptContext<'_>,
    ) -> Result<DownloadedAudio, ClassifiedError> {
        let retrier = BackoffRetrier::new(ctx.config.retry.clone());
        let mut cookies = ctx.credentials.cookies();
        let mut last = None;

        for egress in ctx.ladder.walk() {
            let mut outcome = self.download_via(request, egress, cookies, ctx, &retrier).await;

            if let Err(err) = &outcome {
                if cookies.is_some() && is_extractor_context_error(&err.message) {
                    warn!(method = %self.tag, egress = %egress, "extractor rejected the session, retrying without cookies");
                    cookies = None;
                    outcome = self.download_via(request, egress, None, ctx, &retrier).await;
                }
            }

            match outcome {
                Ok(audio) => {
                    check_duration(&audio, ctx.config.max_duration_seconds)?;
                    info!(
                        method = %self.tag,
                        egress = %egress,
                        path = %audio.path.display(),
                        duration_secs = ?audio.duration_seconds,
                        "audio downloaded"
                    );
                    return Ok(audio);
                }
                Err(err) if err.is_terminal() || !should_escalate(&err) => return Err(err),
                Err(err) => {
                    warn!(method = %self.tag, egress = %egress, kind = %err.kind, error = %err, "escalating to next egress");
                    last = Some(err);
                }
            }
        }

        Err(last.unwrap_or_else(no_egress))
    }

    async fn download_via(
        &self,
        request: &TranscriptRequest,
        egress: &ProxyOption,
        cookies: Option<&Path>,
        ctx: AttemptContext<'_>,
        retrier: &BackoffRetrier,
    ) -> Result<DownloadedAudio, ClassifiedError> {
        let download = DownloadRequest {
            video: &request.video,
            work_dir: ctx.work_dir,
            egress,
            cookies,
        };
        let limit = ctx.config.download_timeout;
        retrier
            .run(self.tag.as_str(), move || {
                with_timeout("audio download", limit, self.downloader.download(download))
            })
            .await
    }

    /// Transcribe a local file (the whole download, or a preview clip of it).
    pub(crate) async fn transcribe_file(
        &self,
        path: &Path,
        options: &TranscriptOptions,
        config: &EngineConfig,
    ) -> Result<TranscriptResult, ClassifiedError> {
        let retrier = BackoffRetrier::new(config.retry.clone());
        let limit = config.transcription_timeout;
        let transcript = retrier
            .run(self.tag.as_str(), move || {
                with_timeout(
                    "transcription",
                    limit,
                    self.stt.transcribe(AudioSource::File(path), options),
                )
            })
            .await?;
        Ok(tagged(self.tag, transcript))
    }
}

fn check_duration(audio: &DownloadedAudio, max_seconds: u64) -> Result<(), ClassifiedError> {
    match audio.duration_seconds {
        Some(d) if d > max_seconds => Err(ClassifiedError::new(
            ErrorKind::Fatal,
            format!("video is too long ({d}s, limit {max_seconds}s)"),
        )),
        _ => Ok(()),
    }
}
