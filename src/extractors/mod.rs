use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::OnceCell;

pub mod captions;
pub mod direct;
pub mod fingerprint;
pub mod youtube;

pub use direct::{DirectEndpointClient, DirectEndpointError};
pub use fingerprint::RequestFingerprint;
pub use youtube::{CaptionLibraryClient, CaptionLibraryError, CaptionTrack};

use crate::config::YoutubeConfig;
use crate::TranscriptError;

/// Language candidate meaning "whatever track the video has"
pub const AUTO_LANGUAGE: &str = "auto";

/// Hosts a video URL must mention to be accepted
const RECOGNIZED_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})(?:[?&/#]|$)").expect("video id pattern is valid")
    })
}

/// An 11-character YouTube video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    /// Parse the identifier out of a YouTube URL.
    ///
    /// Supports watch, short (youtu.be), embed, `/v/` and shorts URLs. Anything
    /// that does not mention a YouTube host is rejected before any network call.
    pub fn from_url(url: &str) -> Result<Self, TranscriptError> {
        let url = url.trim();
        let url_lower = url.to_lowercase();

        if !RECOGNIZED_HOSTS.iter().any(|host| url_lower.contains(host)) {
            return Err(TranscriptError::InvalidInput(format!(
                "{} (expected a youtube.com or youtu.be link)",
                url
            )));
        }

        video_id_pattern()
            .captures(url)
            .and_then(|captures| captures.get(1))
            .map(|m| VideoId(m.as_str().to_string()))
            .ok_or_else(|| {
                TranscriptError::InvalidInput(format!("{} (no 11-character video id found)", url))
            })
    }

    /// Wrap a bare identifier, validating its shape
    pub fn new(id: &str) -> Result<Self, TranscriptError> {
        let valid = id.len() == 11
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(VideoId(id.to_string()))
        } else {
            Err(TranscriptError::InvalidInput(format!(
                "{} (video ids are 11 characters of [0-9A-Za-z_-])",
                id
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL, used when handing the video to the transcription job API
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw failure from one acquisition source, before classification
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Library(#[from] CaptionLibraryError),

    #[error(transparent)]
    Direct(#[from] DirectEndpointError),

    #[error("{0}")]
    Other(String),
}

/// Upstream lookups shared by every language tried within one attempt.
///
/// Created by the orchestrator per attempt and dropped when the attempt ends,
/// so a video's track listing or watch page is requested at most once per
/// attempt. Failures are cached too: a throttled listing is not re-requested
/// for the next language.
#[derive(Debug, Default)]
pub struct AttemptScope {
    tracks: OnceCell<Result<Vec<CaptionTrack>, CaptionLibraryError>>,
    watch_page: OnceCell<Result<String, String>>,
}

impl AttemptScope {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A way of fetching caption text for one video in one language
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Fetch the flat caption text.
    ///
    /// `fingerprint` and `scope` belong to the current attempt.
    async fn fetch(
        &self,
        video_id: &VideoId,
        language: &str,
        fingerprint: &RequestFingerprint,
        scope: &AttemptScope,
    ) -> Result<String, FetchError>;
}

/// Build the HTTP client shared by the caption sources.
///
/// No default headers are installed: identity is supplied per request.
pub fn build_http_client(config: &YoutubeConfig) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10));

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(
            reqwest::Proxy::all(proxy)
                .map_err(|e| anyhow::anyhow!("Invalid proxy URL {}: {}", proxy, e))?,
        );
    }

    builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}
