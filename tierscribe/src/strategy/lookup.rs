use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::{with_timeout, AttemptContext, CaptionSource, CaptionTrack};
use crate::classify::{is_extractor_context_error, ClassifiedError, ErrorKind};
use crate::types::{MethodTag, TranscriptRequest, TranscriptResult};
use crate::video::VideoRef;

const FALLBACK_LANGUAGES: [&str; 3] = ["en", "en-US", "en-GB"];

/// Published captions. Cheapest tier; never diarized.
#[derive(Clone)]
pub struct CaptionLookup {
    source: Arc<dyn CaptionSource>,
}

impl CaptionLookup {
    pub fn new(source: Arc<dyn CaptionSource>) -> Self {
        Self { source }
    }

    pub(crate) async fn attempt(
        &self,
        request: &TranscriptRequest,
        ctx: AttemptContext<'_>,
    ) -> Result<TranscriptResult, ClassifiedError> {
        let video = &request.video;
        let languages = preferred_languages(request.options.language_hint.as_deref());
        let languages = languages.as_slice();
        let limit = ctx.config.download_timeout;
        let cookies = ctx.credentials.cookies();
        // Cleared for the rest of the attempt once the extractor rejects the session.
        let keep_cookies = AtomicBool::new(cookies.is_some());
        let keep_cookies = &keep_cookies;

        let track = ctx
            .ladder
            .escalate("caption lookup", move |egress| async move {
                let jar = cookies.filter(|_| keep_cookies.load(Ordering::Relaxed));
                let outcome = with_timeout(
                    "caption lookup",
                    limit,
                    self.source.fetch(video, languages, &egress, jar),
                )
                .await;
                match outcome {
                    Err(err) if jar.is_some() && is_extractor_context_error(&err.message) => {
                        warn!(egress = %egress, "extractor rejected the session, retrying captions without cookies");
                        keep_cookies.store(false, Ordering::Relaxed);
                        with_timeout(
                            "caption lookup",
                            limit,
                            self.source.fetch(video, languages, &egress, None),
                        )
                        .await
                    }
                    other => other,
                }
            })
            .await?;

        if track.snippets.is_empty() {
            return Err(ClassifiedError::new(
                ErrorKind::Unknown,
                format!("caption track {} has no text", track.language),
            ));
        }

        info!(
            video = %video,
            language = %track.language,
            generated = track.auto_generated,
            snippets = track.snippets.len(),
            "captions found"
        );
        Ok(to_result(video, request.options.language_hint.as_deref(), track))
    }
}

/// The hint first, then English variants, without repeats.
pub(crate) fn preferred_languages(hint: Option<&str>) -> Vec<String> {
    let mut languages: Vec<String> = Vec::with_capacity(4);
    for lang in hint.into_iter().chain(FALLBACK_LANGUAGES) {
        if !languages.iter().any(|l| l == lang) {
            languages.push(lang.to_string());
        }
    }
    languages
}

fn to_result(video: &VideoRef, hint: Option<&str>, track: CaptionTrack) -> TranscriptResult {
    let text = track
        .snippets
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let duration = track
        .snippets
        .last()
        .map(|s| (s.start + s.duration).round().max(0.0) as u64);
    let language = if track.language.is_empty() {
        hint.unwrap_or("en").to_string()
    } else {
        track.language
    };

    TranscriptResult {
        method: MethodTag::Captions,
        text,
        utterances: None,
        speakers: Vec::new(),
        confidence: None,
        audio_duration_seconds: duration,
        language: Some(language),
        transcript_id: format!("yt-captions-{}", video.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::CaptionSnippet;

    #[test]
    fn test_preferred_languages() {
        assert_eq!(preferred_languages(None), vec!["en", "en-US", "en-GB"]);
        assert_eq!(
            preferred_languages(Some("es")),
            vec!["es", "en", "en-US", "en-GB"]
        );
        assert_eq!(preferred_languages(Some("en")), vec!["en", "en-US", "en-GB"]);
        assert_eq!(preferred_languages(Some("en-GB")), vec!["en-GB", "en", "en-US"]);
    }

    #[test]
    fn test_track_to_result() {
        let video = VideoRef::parse("abc12345678").unwrap();
        let track = CaptionTrack {
            language: "en".into(),
            auto_generated: true,
            snippets: vec![
                CaptionSnippet {
                    text: "hello".into(),
                    start: 0.0,
                    duration: 1.5,
                },
                CaptionSnippet {
                    text: " \n".into(),
                    start: 1.5,
                    duration: 0.5,
                },
                CaptionSnippet {
                    text: "world ".into(),
                    start: 2.0,
                    duration: 2.6,
                },
            ],
        };
        let r = to_result(&video, None, track);
        assert_eq!(r.method, MethodTag::Captions);
        assert_eq!(r.text, "hello world");
        assert_eq!(r.audio_duration_seconds, Some(5));
        assert_eq!(r.transcript_id, "yt-captions-abc12345678");
        assert!(r.speakers.is_empty());
        assert!(r.utterances.is_none());
        assert!(r.confidence.is_none());
        assert_eq!(r.language.as_deref(), Some("en"));
    }
}
