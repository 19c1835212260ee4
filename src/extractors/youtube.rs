use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use super::captions::parse_caption_payload;
use super::{AttemptScope, CaptionSource, FetchError, RequestFingerprint, VideoId, AUTO_LANGUAGE};

/// Errors raised by the caption library, typed where the upstream tells us why
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptionLibraryError {
    #[error("Transcripts are disabled for video {0}")]
    TranscriptsDisabled(String),

    #[error("No transcript found for video {video_id} in language {language}")]
    NoTranscriptFound { video_id: String, language: String },

    #[error("Video {0} is unavailable")]
    VideoUnavailable(String),

    #[error("Too many requests (HTTP 429) while fetching video {0}")]
    TooManyRequests(String),

    #[error("YouTube is blocking requests from this IP (bot check) for video {0}")]
    RequestBlocked(String),

    #[error("Video {0} is age restricted and requires sign-in")]
    AgeRestricted(String),

    #[error("Video {video_id} is unplayable: {reason}")]
    VideoUnplayable { video_id: String, reason: String },

    #[error("Could not parse YouTube page data for video {0}")]
    DataUnparsable(String),

    #[error("Caption track for video {0} was empty: no element found")]
    EmptyTranscript(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// A caption track advertised by the player response
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub language_code: String,
    pub base_url: String,
    pub is_generated: bool,
}

/// Caption library client: watch page, player API, caption track, payload
pub struct CaptionLibraryClient {
    client: Client,
    base_url: String,
}

impl CaptionLibraryClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// List the caption tracks of a video
    pub async fn list_tracks(
        &self,
        video_id: &VideoId,
        fingerprint: &RequestFingerprint,
    ) -> Result<Vec<CaptionTrack>, CaptionLibraryError> {
        let html = self.fetch_watch_page(video_id, fingerprint).await?;
        let api_key = extract_innertube_api_key(&html, video_id)?;
        let player = self.fetch_player(video_id, &api_key, fingerprint).await?;

        assert_playability(video_id, &player)?;
        extract_caption_tracks(video_id, &player)
    }

    async fn fetch_watch_page(
        &self,
        video_id: &VideoId,
        fingerprint: &RequestFingerprint,
    ) -> Result<String, CaptionLibraryError> {
        let url = format!("{}/watch?v={}", self.base_url, video_id);
        tracing::debug!("Fetching watch page: {}", url);

        let response = self
            .client
            .get(&url)
            .headers(fingerprint.headers())
            .send()
            .await
            .map_err(|e| CaptionLibraryError::Http(format!("Failed to fetch watch page: {}", e)))?;

        let response = check_http_errors(response, video_id)?;

        response
            .text()
            .await
            .map_err(|e| CaptionLibraryError::Http(format!("Failed to read watch page: {}", e)))
    }

    async fn fetch_player(
        &self,
        video_id: &VideoId,
        api_key: &str,
        fingerprint: &RequestFingerprint,
    ) -> Result<Value, CaptionLibraryError> {
        let url = format!("{}/youtubei/v1/player?key={}", self.base_url, api_key);

        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": "ANDROID",
                    "clientVersion": "20.10.38"
                }
            },
            "videoId": video_id.as_str()
        });

        let response = self
            .client
            .post(&url)
            .headers(fingerprint.headers())
            .json(&body)
            .send()
            .await
            .map_err(|e| CaptionLibraryError::Http(format!("Failed to fetch player data: {}", e)))?;

        let response = check_http_errors(response, video_id)?;

        response
            .json()
            .await
            .map_err(|_| CaptionLibraryError::DataUnparsable(video_id.to_string()))
    }

    async fn fetch_track(
        &self,
        video_id: &VideoId,
        track: &CaptionTrack,
        fingerprint: &RequestFingerprint,
    ) -> Result<String, CaptionLibraryError> {
        let response = self
            .client
            .get(&track.base_url)
            .headers(fingerprint.headers())
            .send()
            .await
            .map_err(|e| CaptionLibraryError::Http(format!("Failed to fetch transcript: {}", e)))?;

        let response = check_http_errors(response, video_id)?;

        let body = response
            .text()
            .await
            .map_err(|e| CaptionLibraryError::Http(format!("Failed to read transcript: {}", e)))?;

        parse_caption_payload(&body)
            .ok_or_else(|| CaptionLibraryError::EmptyTranscript(video_id.to_string()))
    }
}

#[async_trait]
impl CaptionSource for CaptionLibraryClient {
    async fn fetch(
        &self,
        video_id: &VideoId,
        language: &str,
        fingerprint: &RequestFingerprint,
        scope: &AttemptScope,
    ) -> Result<String, FetchError> {
        let listing = scope
            .tracks
            .get_or_init(|| self.list_tracks(video_id, fingerprint))
            .await;
        let tracks = match listing {
            Ok(tracks) => tracks,
            Err(error) => return Err(error.clone().into()),
        };

        let track = find_track(tracks, language).ok_or_else(|| {
            CaptionLibraryError::NoTranscriptFound {
                video_id: video_id.to_string(),
                language: language.to_string(),
            }
        })?;

        tracing::debug!(
            "Using {} caption track '{}' for video {}",
            if track.is_generated { "generated" } else { "manual" },
            track.language_code,
            video_id
        );

        Ok(self.fetch_track(video_id, track, fingerprint).await?)
    }
}

/// Pick a track for `language`, preferring manually created captions.
///
/// `auto` takes the first manual track, else the first generated one.
pub fn find_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let matches = |track: &&CaptionTrack| {
        language == AUTO_LANGUAGE || track.language_code.eq_ignore_ascii_case(language)
    };

    tracks
        .iter()
        .filter(|track| !track.is_generated)
        .find(matches)
        .or_else(|| tracks.iter().filter(|track| track.is_generated).find(matches))
}

fn check_http_errors(response: Response, video_id: &VideoId) -> Result<Response, CaptionLibraryError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CaptionLibraryError::TooManyRequests(video_id.to_string()));
    }

    if !status.is_success() {
        return Err(CaptionLibraryError::Http(format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        )));
    }

    Ok(response)
}

fn extract_innertube_api_key(html: &str, video_id: &VideoId) -> Result<String, CaptionLibraryError> {
    if html.contains("g-recaptcha") {
        return Err(CaptionLibraryError::RequestBlocked(video_id.to_string()));
    }

    let re = Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#)
        .map_err(|_| CaptionLibraryError::DataUnparsable(video_id.to_string()))?;

    re.captures(html)
        .and_then(|captures| captures.get(1))
        .map(|key| key.as_str().to_string())
        .ok_or_else(|| CaptionLibraryError::DataUnparsable(video_id.to_string()))
}

fn assert_playability(video_id: &VideoId, player: &Value) -> Result<(), CaptionLibraryError> {
    let Some(playability) = player.get("playabilityStatus") else {
        return Ok(());
    };

    let status = playability["status"].as_str().unwrap_or("");
    if status == "OK" {
        return Ok(());
    }

    let reason = playability["reason"].as_str().unwrap_or("");

    match status {
        "LOGIN_REQUIRED" if reason.contains("not a bot") => {
            Err(CaptionLibraryError::RequestBlocked(video_id.to_string()))
        }
        "LOGIN_REQUIRED" if reason.contains("inappropriate") => {
            Err(CaptionLibraryError::AgeRestricted(video_id.to_string()))
        }
        "ERROR" if reason.to_lowercase().contains("unavailable") => {
            Err(CaptionLibraryError::VideoUnavailable(video_id.to_string()))
        }
        _ => Err(CaptionLibraryError::VideoUnplayable {
            video_id: video_id.to_string(),
            reason: reason.to_string(),
        }),
    }
}

fn extract_caption_tracks(
    video_id: &VideoId,
    player: &Value,
) -> Result<Vec<CaptionTrack>, CaptionLibraryError> {
    let renderer = &player["captions"]["playerCaptionsTracklistRenderer"];

    let tracks: Vec<CaptionTrack> = renderer["captionTracks"]
        .as_array()
        .map(|tracks| {
            tracks
                .iter()
                .filter_map(|track| {
                    Some(CaptionTrack {
                        language_code: track["languageCode"].as_str()?.to_string(),
                        base_url: track["baseUrl"].as_str()?.replace("&fmt=srv3", ""),
                        is_generated: track["kind"].as_str() == Some("asr"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if tracks.is_empty() {
        return Err(CaptionLibraryError::TranscriptsDisabled(video_id.to_string()));
    }

    Ok(tracks)
}
