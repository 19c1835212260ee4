//! Maps raw acquisition failures onto the classes that drive retry decisions.
//!
//! The caption surface does not type most of its failures, so everything the
//! library cannot name is matched on its message here. Nothing outside this
//! module looks at error strings.

use serde::Serialize;
use std::fmt;

use crate::extractors::{CaptionLibraryError, FetchError};

/// Failure classes the orchestrator acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorClass {
    /// Captions turned off for the video. Stops everything.
    Disabled,
    /// Nothing for this language/strategy. Ends the current strategy only.
    NotFound,
    /// Video private, removed or otherwise inaccessible. Stops everything.
    Unavailable,
    /// Throttled or bot-checked. Retry with backoff.
    RateLimitedOrBlocked,
    /// Malformed or empty response. Retry.
    Transient,
    Unknown,
}

impl ErrorClass {
    pub fn is_terminal(self) -> bool {
        matches!(self, ErrorClass::Disabled | ErrorClass::Unavailable)
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::RateLimitedOrBlocked | ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::Disabled => "disabled",
            ErrorClass::NotFound => "not-found",
            ErrorClass::Unavailable => "unavailable",
            ErrorClass::RateLimitedOrBlocked => "rate-limited",
            ErrorClass::Transient => "transient",
            ErrorClass::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

const THROTTLE_PHRASES: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "blocked",
    "blocking",
    "captcha",
    "not a bot",
];

const THROTTLE_WORDS: &[&str] = &["ip", "rate", "429"];

const TRANSIENT_PHRASES: &[&str] = &[
    "no element found",
    "not valid json",
    "invalid json",
    "parse",
    "empty",
    "unexpected eof",
    "timed out",
    "timeout",
    "connection",
    "error sending request",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "http 500",
    "http 502",
    "http 503",
    "http 504",
];

/// Classify one raw failure. Total and deterministic.
///
/// Typed library errors are matched on their variant so that video ids and
/// URLs embedded in messages never take part in the decision.
pub fn classify(error: &FetchError) -> ErrorClass {
    match error {
        FetchError::Library(library) => match library {
            CaptionLibraryError::TranscriptsDisabled(_) => ErrorClass::Disabled,
            CaptionLibraryError::NoTranscriptFound { .. } => ErrorClass::NotFound,
            CaptionLibraryError::VideoUnavailable(_) => ErrorClass::Unavailable,
            CaptionLibraryError::TooManyRequests(_) | CaptionLibraryError::RequestBlocked(_) => {
                ErrorClass::RateLimitedOrBlocked
            }
            CaptionLibraryError::DataUnparsable(_) | CaptionLibraryError::EmptyTranscript(_) => {
                ErrorClass::Transient
            }
            CaptionLibraryError::AgeRestricted(_) => ErrorClass::Unknown,
            CaptionLibraryError::VideoUnplayable { reason, .. } => classify_message(reason),
            CaptionLibraryError::Http(message) => classify_message(message),
        },
        FetchError::Direct(_) => ErrorClass::Transient,
        FetchError::Other(message) => classify_message(message),
    }
}

/// Classify an untyped upstream message by the phrases it contains.
///
/// URLs are dropped first; their paths and query strings carry video ids.
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message
        .split_whitespace()
        .filter(|token| !token.contains("://"))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let has_throttle_word = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| THROTTLE_WORDS.contains(&word));

    if has_throttle_word || THROTTLE_PHRASES.iter().any(|p| lower.contains(p)) {
        ErrorClass::RateLimitedOrBlocked
    } else if TRANSIENT_PHRASES.iter().any(|p| lower.contains(p)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::DirectEndpointError;

    fn library(error: CaptionLibraryError) -> FetchError {
        FetchError::Library(error)
    }

    #[test]
    fn test_typed_library_errors_map_one_to_one() {
        let id = "dQw4w9WgXcQ".to_string();

        assert_eq!(
            classify(&library(CaptionLibraryError::TranscriptsDisabled(id.clone()))),
            ErrorClass::Disabled
        );
        assert_eq!(
            classify(&library(CaptionLibraryError::NoTranscriptFound {
                video_id: id.clone(),
                language: "en".into()
            })),
            ErrorClass::NotFound
        );
        assert_eq!(
            classify(&library(CaptionLibraryError::VideoUnavailable(id))),
            ErrorClass::Unavailable
        );
    }

    #[test]
    fn test_untyped_library_errors_use_message() {
        let id = "dQw4w9WgXcQ".to_string();

        assert_eq!(
            classify(&library(CaptionLibraryError::TooManyRequests(id.clone()))),
            ErrorClass::RateLimitedOrBlocked
        );
        assert_eq!(
            classify(&library(CaptionLibraryError::RequestBlocked(id.clone()))),
            ErrorClass::RateLimitedOrBlocked
        );
        assert_eq!(
            classify(&library(CaptionLibraryError::EmptyTranscript(id.clone()))),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&library(CaptionLibraryError::DataUnparsable(id.clone()))),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&library(CaptionLibraryError::Http("HTTP 503: Service Unavailable".into()))),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&library(CaptionLibraryError::AgeRestricted(id))),
            ErrorClass::Unknown
        );
    }

    #[test]
    fn test_video_ids_and_urls_do_not_drive_classification() {
        let id = "ab-ip-cdefg".to_string();

        assert_eq!(
            classify(&library(CaptionLibraryError::VideoUnplayable {
                video_id: id.clone(),
                reason: "Playback on other websites has been disabled".into(),
            })),
            ErrorClass::Unknown
        );
        assert_eq!(
            classify(&library(CaptionLibraryError::Http(format!(
                "Failed to fetch watch page: error sending request for url (https://www.youtube.com/watch?v={})",
                id
            )))),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&library(CaptionLibraryError::AgeRestricted("ratelimit42".into()))),
            ErrorClass::Unknown
        );
        assert_eq!(
            classify_message("request to https://www.youtube.com/watch?v=x-429-rate1 was refused"),
            ErrorClass::Unknown
        );
    }

    #[test]
    fn test_direct_errors_are_transient() {
        let error = FetchError::Direct(DirectEndpointError {
            video_id: "dQw4w9WgXcQ".into(),
            reason: "json3: HTTP 429".into(),
        });

        assert_eq!(classify(&error), ErrorClass::Transient);
    }

    #[test]
    fn test_message_classification() {
        assert_eq!(classify_message("Rate limit exceeded"), ErrorClass::RateLimitedOrBlocked);
        assert_eq!(classify_message("Your IP was flagged"), ErrorClass::RateLimitedOrBlocked);
        assert_eq!(classify_message("no element found: line 1"), ErrorClass::Transient);
        assert_eq!(classify_message("response text is not valid JSON"), ErrorClass::Transient);
        assert_eq!(classify_message("something odd happened"), ErrorClass::Unknown);
        assert_eq!(classify_message(""), ErrorClass::Unknown);
        // "ip" only counts as a word
        assert_eq!(classify_message("description missing"), ErrorClass::Unknown);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let samples = [
            "HTTP 429 Too Many Requests",
            "request blocked",
            "unexpected EOF while parsing",
            "mystery",
        ];

        for sample in samples {
            let error = FetchError::Other(sample.to_string());
            let first = classify(&error);
            for _ in 0..10 {
                assert_eq!(classify(&error), first);
            }
        }
    }

    #[test]
    fn test_class_predicates() {
        assert!(ErrorClass::Disabled.is_terminal());
        assert!(ErrorClass::Unavailable.is_terminal());
        assert!(!ErrorClass::NotFound.is_terminal());
        assert!(ErrorClass::Transient.is_retryable());
        assert!(ErrorClass::RateLimitedOrBlocked.is_retryable());
        assert!(!ErrorClass::Unknown.is_retryable());
    }
}
