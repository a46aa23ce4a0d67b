use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use super::{Failure, ResolutionEngine};
use crate::classify::{ClassifiedError, ErrorKind};
use crate::error::{Error, Result};
use crate::strategy::{with_timeout, AttemptContext, DownloadTranscribe};
use crate::types::{Resolution, TranscriptOptions, TranscriptRequest, TranscriptResult, VideoMetadata};

const CHANNEL_CAPACITY: usize = 16;

/// Where a progressive resolution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validation,
    Metadata,
    Download,
    Transcription,
}

impl Phase {
    pub fn of(error: &Error) -> Self {
        match error {
            Error::InvalidVideo(_) | Error::InvalidOption(_) => Phase::Validation,
            Error::Rejected(_) => Phase::Metadata,
            Error::TranscriptionFailed(_) | Error::SpeechToText(_) => Phase::Transcription,
            _ => Phase::Download,
        }
    }
}

/// One message on a progressive resolution's channel.
///
/// A stream carries at most one `Metadata`, at most one `Partial`, and always ends
/// with exactly one `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Metadata(VideoMetadata),
    /// Transcript of the leading clip of a long source.
    Partial { text: String, audio_duration: u64 },
    Complete(Box<Resolution>),
    Error { error: String, phase: Phase },
}

impl ProgressEvent {
    pub fn from_error(error: &Error) -> Self {
        ProgressEvent::Error {
            error: error.to_string(),
            phase: Phase::of(error),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Metadata(_) => "metadata",
            ProgressEvent::Partial { .. } => "partial",
            ProgressEvent::Complete(_) => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete(_) | ProgressEvent::Error { .. })
    }

    /// Render as a server-sent event frame.
    pub fn to_sse(&self) -> Result<String> {
        Ok(format!(
            "event: {}\ndata: {}\n\n",
            self.name(),
            serde_json::to_string(self)?
        ))
    }
}

/// Sending half of a progressive resolution. Once the receiver is gone, events are
/// dropped and the resolution carries on to completion.
pub(super) struct Events {
    tx: mpsc::Sender<ProgressEvent>,
    closed: AtomicBool,
}

impl Events {
    fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }

    pub(super) async fn send(&self, event: ProgressEvent) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let name = event.name();
        if self.tx.send(event).await.is_err() {
            debug!(event = name, "receiver dropped, discarding further events");
            self.closed.store(true, Ordering::Relaxed);
        }
    }
}

impl ResolutionEngine {
    /// Resolve on a background task, streaming progress as it happens.
    ///
    /// Must be called from within a Tokio runtime. The resolution runs to completion
    /// even if the receiver is dropped early, so its temp files are always removed.
    pub fn resolve_progressive(&self, request: TranscriptRequest) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let engine = self.clone();
        tokio::spawn(async move {
            let events = Events::new(tx);
            let last = match engine.run(&request, Some(&events)).await {
                Ok(resolution) => ProgressEvent::Complete(Box::new(resolution)),
                Err(e) => ProgressEvent::from_error(&e),
            };
            events.send(last).await;
        });
        rx
    }

    /// Like [`resolve_progressive`](Self::resolve_progressive), from raw input. Invalid
    /// input yields a single validation error event.
    pub fn resolve_input_progressive(
        &self,
        input: &str,
        options: TranscriptOptions,
    ) -> mpsc::Receiver<ProgressEvent> {
        match TranscriptRequest::parse(input, options) {
            Ok(request) => self.resolve_progressive(request),
            Err(e) => {
                let (tx, rx) = mpsc::channel(1);
                // Capacity 1 and a fresh channel: this cannot fail.
                let _ = tx.try_send(ProgressEvent::from_error(&e));
                rx
            }
        }
    }

    /// Download, then transcribe the full audio while a preview clip of long sources
    /// is transcribed alongside it.
    pub(super) async fn race(
        &self,
        strategy: &DownloadTranscribe,
        request: &TranscriptRequest,
        ctx: AttemptContext<'_>,
        events: &Events,
        known_duration: Option<u64>,
    ) -> std::result::Result<TranscriptResult, Failure> {
        let audio = strategy.download(request, ctx).await.map_err(Failure::Tier)?;
        let estimated = audio.duration_seconds.or(known_duration);

        let mut full = self.spawn_transcription(strategy, audio.path.clone(), &request.options);

        let clip_seconds = self.config.partial_clip_seconds;
        let clip = match estimated {
            Some(d) if d > self.config.partial_threshold_seconds => {
                self.cut_preview(&audio.path, ctx.work_dir).await
            }
            _ => None,
        };
        let Some(clip) = clip else {
            debug!(duration_secs = ?estimated, "single transcription");
            return joined(full.await).map(|r| with_duration(r, estimated)).map_err(Failure::Tier);
        };

        let mut partial = self.spawn_transcription(strategy, clip, &request.options);
        let mut delivered = false;

        tokio::select! {
            biased;
            res = &mut full => {
                debug!("full transcription finished first, no partial");
                // The preview task reads from the work dir; let it finish before cleanup.
                let _ = partial.await;
                return joined(res).map(|r| with_duration(r, estimated)).map_err(Failure::Tier);
            }
            res = &mut partial => {
                match joined(res) {
                    Ok(preview) if !full.is_finished() => {
                        info!(clip_secs = clip_seconds, "partial transcript ready");
                        events
                            .send(ProgressEvent::Partial {
                                text: preview.render_text(),
                                audio_duration: clip_seconds,
                            })
                            .await;
                        delivered = true;
                    }
                    Ok(_) => debug!("full transcription already done, dropping partial"),
                    Err(e) => debug!(error = %e, "partial transcription failed"),
                }
            }
        }

        match joined(full.await) {
            Ok(result) => Ok(with_duration(result, estimated)),
            Err(e) if delivered => {
                warn!(error = %e, "full transcription failed after partial was delivered");
                Err(Failure::AfterPartial(e))
            }
            Err(e) => Err(Failure::Tier(e)),
        }
    }

    fn spawn_transcription(
        &self,
        strategy: &DownloadTranscribe,
        path: PathBuf,
        options: &TranscriptOptions,
    ) -> JoinHandle<std::result::Result<TranscriptResult, ClassifiedError>> {
        let strategy = strategy.clone();
        let options = options.clone();
        let config = self.config.clone();
        tokio::spawn(async move { strategy.transcribe_file(&path, &options, &config).await })
    }

    /// Cut the leading clip. Any failure means no partial, never a failed tier.
    async fn cut_preview(&self, source: &Path, work_dir: &Path) -> Option<PathBuf> {
        let seconds = self.config.partial_clip_seconds;
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("m4a");
        let dest = work_dir.join(format!("preview-{seconds}s.{ext}"));
        match with_timeout(
            "preview clip",
            self.config.trim_timeout,
            self.trimmer.trim(source, &dest, seconds),
        )
        .await
        {
            Ok(()) => Some(dest),
            Err(e) => {
                debug!(error = %e, "could not cut preview clip");
                None
            }
        }
    }
}

fn joined<T>(
    res: std::result::Result<std::result::Result<T, ClassifiedError>, JoinError>,
) -> std::result::Result<T, ClassifiedError> {
    match res {
        Ok(inner) => inner,
        Err(e) => Err(ClassifiedError::new(
            ErrorKind::Fatal,
            format!("transcription task aborted: {e}"),
        )),
    }
}

fn with_duration(mut result: TranscriptResult, estimated: Option<u64>) -> TranscriptResult {
    if result.audio_duration_seconds.is_none() {
        result.audio_duration_seconds = estimated;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::VideoRef;

    #[test]
    fn test_event_wire_format() {
        let event = ProgressEvent::Partial {
            text: "hello".into(),
            audio_duration: 60,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "partial");
        assert_eq!(json["audio_duration"], 60);
        assert_eq!(
            event.to_sse().unwrap(),
            "event: partial\ndata: {\"event\":\"partial\",\"text\":\"hello\",\"audio_duration\":60}\n\n"
        );
    }

    #[test]
    fn test_metadata_event_flattens_fields() {
        let v = VideoRef::parse("abc12345678").unwrap();
        let json = serde_json::to_value(ProgressEvent::Metadata(VideoMetadata::placeholder(&v)))
            .unwrap();
        assert_eq!(json["event"], "metadata");
        assert_eq!(json["video_id"], "abc12345678");
    }

    #[test]
    fn test_error_phases() {
        let e = Error::InvalidVideo("x".into());
        assert_eq!(Phase::of(&e), Phase::Validation);
        let e = Error::TranscriptionFailed(ClassifiedError::new(ErrorKind::Unknown, "boom"));
        assert_eq!(Phase::of(&e), Phase::Transcription);
        let e = Error::Rejected(ClassifiedError::new(ErrorKind::NotFound, "Video not found"));
        assert_eq!(Phase::of(&e), Phase::Metadata);

        let event = ProgressEvent::from_error(&Error::InvalidVideo("x".into()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["phase"], "validation");
        assert!(event.is_terminal());
    }
}
