use std::sync::Arc;

use super::{tagged, with_timeout, AttemptContext, AudioSource, SpeechToText};
use crate::classify::ClassifiedError;
use crate::retry::BackoffRetrier;
use crate::types::{MethodTag, TranscriptRequest, TranscriptResult};

/// Hand the watch URL straight to the speech-to-text service. Last resort: rarely
/// works for YouTube pages, but costs nothing locally.
#[derive(Clone)]
pub struct DirectTranscribe {
    stt: Arc<dyn SpeechToText>,
}

impl DirectTranscribe {
    pub fn new(stt: Arc<dyn SpeechToText>) -> Self {
        Self { stt }
    }

    pub(crate) async fn attempt(
        &self,
        request: &TranscriptRequest,
        ctx: AttemptContext<'_>,
    ) -> Result<TranscriptResult, ClassifiedError> {
        let url = request.video.watch_url();
        let url = url.as_str();
        let options = &request.options;
        let limit = ctx.config.transcription_timeout;

        let transcript = BackoffRetrier::new(ctx.config.retry.clone())
            .run(MethodTag::DirectUrl.as_str(), move || {
                with_timeout(
                    "transcription",
                    limit,
                    self.stt.transcribe(AudioSource::Url(url), options),
                )
            })
            .await?;
        Ok(tagged(MethodTag::DirectUrl, transcript))
    }
}
