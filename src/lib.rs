//! YT Transcriptor - resilient transcript acquisition for YouTube videos
//!
//! This library retrieves caption text for a video by walking an ordered list of
//! acquisition strategies (caption library, direct timed-text endpoint), each with
//! its own retry budget and request fingerprinting, and falls back to an
//! asynchronous third-party transcription job when no captions can be fetched.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod transcribe;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{CaptionSource, FetchError, VideoId};
pub use transcribe::classifier::ErrorClass;
pub use transcribe::normalize::{TextLimits, ValidationError};
pub use transcribe::{AcquisitionEngine, AcquisitionStrategy, TranscriptResult};

/// Result type used for application plumbing
pub type Result<T> = anyhow::Result<T>;

/// Failures that cross the engine boundary.
///
/// Strategy-local errors are absorbed by the orchestrator; only one of these
/// reaches the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Invalid YouTube URL: {0}")]
    InvalidInput(String),

    #[error("Transcripts are disabled for this video: {0}")]
    Disabled(String),

    #[error("The video is unavailable or private: {0}")]
    Unavailable(String),

    #[error("Upstream is rate limiting or blocking requests, try again later: {0}")]
    RateLimited(String),

    #[error("Timed out: {0}. Try a shorter video")]
    TimedOut(String),

    #[error("Transcript rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("Could not retrieve transcript: {0}")]
    Unknown(String),
}

impl TranscriptError {
    /// Stable machine-readable code for callers
    pub fn code(&self) -> &'static str {
        match self {
            TranscriptError::InvalidInput(_) => "invalid_input",
            TranscriptError::Disabled(_) => "disabled",
            TranscriptError::Unavailable(_) => "unavailable",
            TranscriptError::RateLimited(_) => "rate_limited",
            TranscriptError::TimedOut(_) => "timed_out",
            TranscriptError::Validation(_) => "validation",
            TranscriptError::Unknown(_) => "unknown",
        }
    }

    /// HTTP-style status for callers that expose the engine over a web endpoint
    pub fn status_code(&self) -> u16 {
        match self {
            TranscriptError::InvalidInput(_) => 400,
            TranscriptError::Disabled(_) | TranscriptError::Unavailable(_) => 404,
            TranscriptError::Validation(_) => 422,
            TranscriptError::RateLimited(_) => 429,
            TranscriptError::Unknown(_) => 502,
            TranscriptError::TimedOut(_) => 504,
        }
    }

    /// Whether retrying the same request later could succeed
    pub fn is_retryable_later(&self) -> bool {
        matches!(
            self,
            TranscriptError::RateLimited(_) | TranscriptError::TimedOut(_)
        )
    }
}
