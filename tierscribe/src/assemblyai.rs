use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::strategy::{AudioSource, SpeechToText, SpeechTranscript};
use crate::types::{TranscriptOptions, Utterance};

const API_BASE: &str = "https://api.assemblyai.com";
const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Speech-to-text through AssemblyAI's v2 REST API.
///
/// Local files are uploaded first; URLs are handed over as-is. Polling continues
/// until the job completes or errors, so callers bound it with a timeout.
#[derive(Clone)]
pub struct AssemblyAi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
}

impl fmt::Debug for AssemblyAi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyAi")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct TranscriptJob<'a> {
    audio_url: &'a str,
    speaker_labels: bool,
    punctuate: bool,
    format_text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    speakers_expected: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    language_detection: bool,
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Deserialize)]
struct JobReply {
    id: String,
    status: JobStatus,
    error: Option<String>,
    text: Option<String>,
    utterances: Option<Vec<UtteranceReply>>,
    confidence: Option<f64>,
    audio_duration: Option<f64>,
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UtteranceReply {
    speaker: String,
    text: String,
    start: u64,
    end: u64,
    confidence: f64,
}

impl AssemblyAi {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::InvalidOption("AssemblyAI API key is empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            api_key,
            base_url: API_BASE.to_string(),
            poll_interval: POLL_INTERVAL,
        })
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn upload(&self, path: &std::path::Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        info!(path = %path.display(), bytes = bytes.len(), "uploading audio");
        let response = self
            .client
            .post(format!("{}/v2/upload", self.base_url))
            .header(AUTHORIZATION, &self.api_key)
            .body(bytes)
            .send()
            .await?;
        let reply: UploadReply = checked(response).await?.json().await?;
        Ok(reply.upload_url)
    }

    async fn submit(&self, audio_url: &str, options: &TranscriptOptions) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v2/transcript", self.base_url))
            .header(AUTHORIZATION, &self.api_key)
            .json(&job(audio_url, options))
            .send()
            .await?;
        let reply: JobReply = checked(response).await?.json().await?;
        debug!(job = %reply.id, "transcription job submitted");
        Ok(reply.id)
    }

    async fn poll(&self, id: &str) -> Result<JobReply> {
        loop {
            let response = self
                .client
                .get(format!("{}/v2/transcript/{id}", self.base_url))
                .header(AUTHORIZATION, &self.api_key)
                .send()
                .await?;
            let reply: JobReply = checked(response).await?.json().await?;
            match reply.status {
                JobStatus::Completed => return Ok(reply),
                JobStatus::Error => {
                    let reason = reply.error.as_deref().unwrap_or("no reason given");
                    return Err(Error::SpeechToText(format!("Transcription failed: {reason}")));
                }
                JobStatus::Queued | JobStatus::Processing => {
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl SpeechToText for AssemblyAi {
    async fn transcribe(
        &self,
        source: AudioSource<'_>,
        options: &TranscriptOptions,
    ) -> Result<SpeechTranscript> {
        let audio_url = match source {
            AudioSource::File(path) => self.upload(path).await?,
            AudioSource::Url(url) => url.to_string(),
        };
        let id = self.submit(&audio_url, options).await?;
        let reply = self.poll(&id).await?;
        info!(job = %reply.id, duration_secs = ?reply.audio_duration, "transcription completed");
        Ok(into_transcript(reply))
    }
}

fn job<'a>(audio_url: &'a str, options: &'a TranscriptOptions) -> TranscriptJob<'a> {
    let language_code = options.language_hint.as_deref();
    TranscriptJob {
        audio_url,
        speaker_labels: options.want_speaker_labels,
        punctuate: true,
        format_text: true,
        speakers_expected: options
            .expected_speaker_count
            .filter(|_| options.want_speaker_labels),
        language_code,
        language_detection: language_code.is_none(),
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::SpeechToText(format!(
        "HTTP {}: {}",
        status.as_u16(),
        body.trim()
    )))
}

fn into_transcript(reply: JobReply) -> SpeechTranscript {
    let utterances = reply.utterances.filter(|u| !u.is_empty()).map(|us| {
        us.into_iter()
            .map(|u| Utterance {
                speaker: u.speaker,
                text: u.text,
                start_ms: u.start,
                end_ms: u.end,
                confidence: u.confidence,
            })
            .collect()
    });
    SpeechTranscript {
        id: reply.id,
        text: reply.text.unwrap_or_default(),
        utterances,
        confidence: reply.confidence,
        audio_duration_seconds: reply.audio_duration.map(|d| d.round() as u64),
        language: reply.language_code,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::classify::ErrorKind;

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(AssemblyAi::new("  "), Err(Error::InvalidOption(_))));
    }

    #[test]
    fn test_debug_hides_key() {
        let dbg = format!("{:?}", AssemblyAi::new("secret-key").unwrap());
        assert!(!dbg.contains("secret-key"));
    }

    #[test]
    fn test_job_with_defaults_detects_language() {
        let body = serde_json::to_value(job("https://u", &TranscriptOptions::default())).unwrap();
        assert_eq!(
            body,
            json!({
                "audio_url": "https://u",
                "speaker_labels": true,
                "punctuate": true,
                "format_text": true,
                "language_detection": true
            })
        );
    }

    #[test]
    fn test_job_with_hints() {
        let options = TranscriptOptions::new()
            .expected_speakers(3)
            .unwrap()
            .language("es");
        let body = serde_json::to_value(job("https://u", &options)).unwrap();
        assert_eq!(body["speakers_expected"], 3);
        assert_eq!(body["language_code"], "es");
        assert!(body.get("language_detection").is_none());

        let options = options.speaker_labels(false);
        let body = serde_json::to_value(job("https://u", &options)).unwrap();
        assert!(body.get("speakers_expected").is_none());
        assert_eq!(body["speaker_labels"], false);
    }

    #[test]
    fn test_completed_reply() {
        let reply: JobReply = serde_json::from_value(json!({
            "id": "t-1",
            "status": "completed",
            "text": "Hi there. Hello.",
            "utterances": [
                {"speaker": "A", "text": "Hi there.", "start": 0, "end": 900, "confidence": 0.97},
                {"speaker": "B", "text": "Hello.", "start": 1000, "end": 1500, "confidence": 0.91}
            ],
            "confidence": 0.94,
            "audio_duration": 61.6,
            "language_code": "en_us",
            "words": []
        }))
        .unwrap();
        let t = into_transcript(reply);
        assert_eq!(t.id, "t-1");
        assert_eq!(t.audio_duration_seconds, Some(62));
        assert_eq!(t.language.as_deref(), Some("en_us"));
        let utterances = t.utterances.unwrap();
        assert_eq!(utterances[1].speaker, "B");
        assert_eq!(utterances[1].start_ms, 1000);
    }

    #[test]
    fn test_reply_without_utterances() {
        let reply: JobReply = serde_json::from_value(json!({
            "id": "t-2",
            "status": "completed",
            "text": "plain",
            "utterances": []
        }))
        .unwrap();
        let t = into_transcript(reply);
        assert!(t.utterances.is_none());
        assert_eq!(t.confidence, None);
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transient() {
        let stt = AssemblyAi::new("k").unwrap().base_url("http://127.0.0.1:9");
        let err = stt
            .transcribe(
                AudioSource::Url("https://www.youtube.com/watch?v=abc12345678"),
                &TranscriptOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.classify().kind, ErrorKind::Transient);
    }
}
