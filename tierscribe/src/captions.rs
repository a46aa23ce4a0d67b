use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::proxy::ProxyOption;
use crate::strategy::{CaptionSnippet, CaptionSource, CaptionTrack};
use crate::video::VideoRef;
use crate::ytdlp::YtDlp;

/// Published captions, located through yt-dlp's info JSON and fetched as json3.
#[derive(Debug, Clone, Default)]
pub struct YtDlpCaptions {
    ytdlp: YtDlp,
}

/// A track chosen from the info JSON.
#[derive(Debug, Clone, PartialEq)]
struct TrackRef {
    language: String,
    url: String,
    auto_generated: bool,
}

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    segs: Option<Vec<Json3Seg>>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

impl YtDlpCaptions {
    pub fn new() -> Self {
        Self::with_ytdlp(YtDlp::primary())
    }

    pub fn with_ytdlp(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }

    fn client_for(egress: &ProxyOption) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(url) = egress.proxy_url() {
            builder = builder.proxy(reqwest::Proxy::all(url)?);
        }
        Ok(builder.build()?)
    }
}

#[async_trait]
impl CaptionSource for YtDlpCaptions {
    async fn fetch(
        &self,
        video: &VideoRef,
        languages: &[String],
        egress: &ProxyOption,
        cookies: Option<&Path>,
    ) -> Result<CaptionTrack> {
        let info = self.ytdlp.dump_json(video, egress, cookies).await?;
        let track = choose_track(&info, languages).ok_or_else(|| {
            Error::Download(format!(
                "no caption track in any of: {}",
                languages.join(", ")
            ))
        })?;
        debug!(video = %video, language = %track.language, auto = track.auto_generated, "caption track chosen");

        let response = Self::client_for(egress)?.get(&track.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Download(format!(
                "caption fetch failed: HTTP {}",
                status.as_u16()
            )));
        }
        let body: Json3 = response.json().await?;

        Ok(CaptionTrack {
            language: track.language,
            auto_generated: track.auto_generated,
            snippets: snippets(body),
        })
    }
}

/// First preferred language with a json3 track; manual captions beat automatic ones
/// for the same language.
fn choose_track(info: &Value, languages: &[String]) -> Option<TrackRef> {
    languages.iter().find_map(|lang| {
        [("subtitles", false), ("automatic_captions", true)]
            .into_iter()
            .find_map(|(table, auto_generated)| {
                let url = info[table][lang]
                    .as_array()?
                    .iter()
                    .find(|f| f["ext"] == "json3")?["url"]
                    .as_str()?;
                Some(TrackRef {
                    language: lang.clone(),
                    url: url.to_string(),
                    auto_generated,
                })
            })
    })
}

fn snippets(body: Json3) -> Vec<CaptionSnippet> {
    body.events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs?.into_iter().map(|s| s.utf8).collect();
            let text = text.replace('\n', " ").trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(CaptionSnippet {
                text,
                start: event.t_start_ms as f64 / 1000.0,
                duration: event.d_duration_ms as f64 / 1000.0,
            })
        })
        .collect()
}
