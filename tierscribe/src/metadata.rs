use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::classify::{ClassifiedError, ErrorKind};
use crate::error::Error;
use crate::types::VideoMetadata;
use crate::video::VideoRef;

const OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Fetches display metadata for a video.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, video: &VideoRef) -> Result<VideoMetadata, ClassifiedError>;
}

/// Metadata from YouTube's oEmbed endpoint. Needs no credentials but carries no duration.
#[derive(Debug, Clone)]
pub struct OEmbed {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct OEmbedBody {
    title: Option<String>,
    author_name: Option<String>,
}

impl OEmbed {
    pub fn new() -> crate::Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: OEMBED_ENDPOINT.to_string(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn request(&self, video: &VideoRef) -> Result<OEmbedBody, ClassifiedError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", video.watch_url().as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|e| Error::from(e).classify())?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, video));
        }
        response
            .json::<OEmbedBody>()
            .await
            .map_err(|e| Error::from(e).classify())
    }
}

#[async_trait]
impl MetadataFetcher for OEmbed {
    async fn fetch(&self, video: &VideoRef) -> Result<VideoMetadata, ClassifiedError> {
        let body = self.request(video).await?;
        debug!(video = %video, title = ?body.title, "oEmbed metadata");
        Ok(from_body(video, body))
    }
}

fn from_body(video: &VideoRef, body: OEmbedBody) -> VideoMetadata {
    let placeholder = VideoMetadata::placeholder(video);
    VideoMetadata {
        title: body.title.unwrap_or(placeholder.title.clone()),
        author: body.author_name.unwrap_or(placeholder.author.clone()),
        ..placeholder
    }
}

fn status_error(status: StatusCode, video: &VideoRef) -> ClassifiedError {
    match status {
        StatusCode::NOT_FOUND => {
            ClassifiedError::new(ErrorKind::NotFound, format!("Video not found: {video}"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClassifiedError::new(
            ErrorKind::Unavailable,
            format!("Video is private or unavailable: {video}"),
        ),
        other => crate::classify::classify(&format!("oEmbed HTTP {}", other.as_u16())),
    }
}
