use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;

use super::captions::parse_caption_payload;
use super::{AttemptScope, CaptionSource, FetchError, RequestFingerprint, VideoId, AUTO_LANGUAGE};

/// Response formats requested from the timed-text endpoint, in order
pub const TIMEDTEXT_FORMATS: &[&str] = &["json3", "srv3", "srv1"];

/// Every direct endpoint failure is treated as intermittent by the classifier
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Direct caption endpoint failed for video {video_id}: {reason}")]
pub struct DirectEndpointError {
    pub video_id: String,
    pub reason: String,
}

fn caption_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""baseUrl":\s*"([^"]*timedtext[^"]*)""#).expect("caption url pattern is valid")
    })
}

/// Fetches captions straight from the timed-text endpoint, bypassing the player API
pub struct DirectEndpointClient {
    client: Client,
    base_url: String,
}

impl DirectEndpointClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Timed-text URL for one language and format
    pub fn timedtext_url(&self, video_id: &VideoId, language: &str, format: &str) -> String {
        let language_params = if language == AUTO_LANGUAGE {
            "lang=en&kind=asr".to_string()
        } else {
            format!("lang={}", urlencoding::encode(language))
        };

        format!(
            "{}/api/timedtext?v={}&{}&fmt={}",
            self.base_url, video_id, language_params, format
        )
    }

    /// GET a caption document and parse it; `Err` carries a short reason
    async fn fetch_document(&self, url: &str, fingerprint: &RequestFingerprint) -> Result<String, String> {
        tracing::debug!("Requesting caption document: {}", url);

        let response = self
            .client
            .get(url)
            .headers(fingerprint.headers())
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read body: {}", e))?;

        parse_caption_payload(&body).ok_or_else(|| "empty or unparsable payload".to_string())
    }

    /// Watch page HTML, scraped for caption track URLs
    async fn fetch_watch_page(
        &self,
        video_id: &VideoId,
        fingerprint: &RequestFingerprint,
    ) -> Result<String, String> {
        let url = format!("{}/watch?v={}", self.base_url, video_id);

        let response = self
            .client
            .get(&url)
            .headers(fingerprint.headers())
            .send()
            .await
            .map_err(|e| format!("watch page request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("watch page HTTP {}", response.status().as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| format!("failed to read watch page: {}", e))
    }
}

/// Pick the scraped track for `language`, or the first one for `auto`
pub fn select_scraped_url(html: &str, language: &str) -> Option<String> {
    let urls: Vec<String> = caption_url_pattern()
        .captures_iter(html)
        .filter_map(|captures| captures.get(1))
        .map(|m| unescape_json_url(m.as_str()))
        .collect();

    if language == AUTO_LANGUAGE {
        return urls.into_iter().next();
    }

    let needle = format!("lang={}", language);
    urls.into_iter().find(|url| {
        url.split(['?', '&'])
            .any(|param| param.eq_ignore_ascii_case(&needle))
    })
}

fn unescape_json_url(raw: &str) -> String {
    raw.replace("\\u0026", "&")
        .replace("\\u003d", "=")
        .replace("\\/", "/")
}

#[async_trait]
impl CaptionSource for DirectEndpointClient {
    async fn fetch(
        &self,
        video_id: &VideoId,
        language: &str,
        fingerprint: &RequestFingerprint,
        scope: &AttemptScope,
    ) -> Result<String, FetchError> {
        let mut failures = Vec::new();

        for format in TIMEDTEXT_FORMATS {
            let url = self.timedtext_url(video_id, language, format);
            match self.fetch_document(&url, fingerprint).await {
                Ok(text) => return Ok(text),
                Err(reason) => {
                    tracing::debug!("timedtext fmt={} failed for {}: {}", format, video_id, reason);
                    failures.push(format!("{}: {}", format, reason));
                }
            }
        }

        let watch_page = scope
            .watch_page
            .get_or_init(|| self.fetch_watch_page(video_id, fingerprint))
            .await;

        let scraped = match watch_page {
            Ok(html) => match select_scraped_url(html, language) {
                Some(url) => self.fetch_document(&url, fingerprint).await,
                None => Err(format!("no caption track for language {} in watch page", language)),
            },
            Err(reason) => Err(reason.clone()),
        };

        scraped.map_err(|reason| {
            failures.push(format!("scrape: {}", reason));
            FetchError::Direct(DirectEndpointError {
                video_id: video_id.to_string(),
                reason: failures.join("; "),
            })
        })
    }
}
