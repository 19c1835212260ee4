use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Status values reported by the transcription job API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One job as last reported by the API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AsyncJob {
    #[serde(alias = "id")]
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "id")]
    job_id: String,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    video_url: &'a str,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("transcription job submission failed: {0}")]
    Submit(String),

    #[error("transcription job failed: {0}")]
    Failed(String),

    #[error("transcription job did not finish after {polls} status checks ({elapsed_secs}s)")]
    TimedOut { polls: u32, elapsed_secs: u64 },

    /// Network or server-side hiccup while polling; polling continues
    #[error("transcription job status check failed: {0}")]
    PollTransient(String),

    #[error("transcription job status check rejected: {0}")]
    Poll(String),
}

/// Third-party asynchronous transcription job API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Submit a video; returns the job id
    async fn submit(&self, video_url: &str) -> Result<String, JobError>;

    /// Read the current state of a job
    async fn status(&self, job_id: &str) -> Result<AsyncJob, JobError>;
}

/// HTTP implementation of [`JobApi`]
pub struct HttpJobApi {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpJobApi {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn submit(&self, video_url: &str) -> Result<String, JobError> {
        tracing::debug!("Submitting transcription job for {}", video_url);

        let response = self
            .client
            .post(format!("{}/transcript", self.base_url))
            .header("Authorization", &self.api_key)
            .json(&SubmitRequest { video_url })
            .send()
            .await
            .map_err(|e| JobError::Submit(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Submit(format!("HTTP {}: {}", status.as_u16(), body.trim())));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| JobError::Submit(format!("invalid submit response: {}", e)))?;

        Ok(submitted.job_id)
    }

    async fn status(&self, job_id: &str) -> Result<AsyncJob, JobError> {
        let response = self
            .client
            .get(format!("{}/transcript/{}", self.base_url, urlencoding::encode(job_id)))
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| JobError::PollTransient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(JobError::PollTransient(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(JobError::Poll(format!("HTTP {}", status.as_u16())));
        }

        response
            .json()
            .await
            .map_err(|e| JobError::Poll(format!("invalid status response: {}", e)))
    }
}

/// Submits a video and polls its job until it completes, fails or runs out of polls
pub struct TranscriptionJobProcessor {
    api: Arc<dyn JobApi>,
    poll_interval: Duration,
    max_poll_attempts: u32,
    show_progress: bool,
}

impl TranscriptionJobProcessor {
    pub fn new(api: Arc<dyn JobApi>, poll_interval: Duration, max_poll_attempts: u32) -> Self {
        Self {
            api,
            poll_interval,
            max_poll_attempts,
            show_progress: false,
        }
    }

    /// Show a terminal spinner while waiting
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn max_poll_attempts(&self) -> u32 {
        self.max_poll_attempts
    }

    /// Submit `video_url` and wait for its text
    pub async fn transcribe(&self, video_url: &str) -> Result<String, JobError> {
        let job_id = self.api.submit(video_url).await?;
        tracing::info!("Transcription job submitted: {}", job_id);

        self.wait_for_completion(&job_id).await
    }

    /// Poll a submitted job until it reaches a terminal status or the poll ceiling
    pub async fn wait_for_completion(&self, job_id: &str) -> Result<String, JobError> {
        let progress = if self.show_progress {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };
        progress.set_message("Waiting for transcription job...");

        let start_time = Instant::now();

        for check in 1..=self.max_poll_attempts {
            match self.api.status(job_id).await {
                Ok(job) => match job.status {
                    JobStatus::Completed => {
                        progress.finish_with_message("Transcription completed!");
                        tracing::info!("Transcription job {} completed after {} checks", job_id, check);
                        return Ok(job.text.unwrap_or_default());
                    }
                    JobStatus::Failed => {
                        progress.finish_with_message("Transcription failed");
                        let reason = job.error.unwrap_or_else(|| "no reason given".to_string());
                        return Err(JobError::Failed(reason));
                    }
                    JobStatus::Queued | JobStatus::Processing => {
                        progress.set_message(format!(
                            "Transcribing... ({}s elapsed, check #{}, {:?})",
                            start_time.elapsed().as_secs(),
                            check,
                            job.status
                        ));
                    }
                },
                Err(JobError::PollTransient(reason)) => {
                    tracing::warn!("Status check #{} for job {} failed, will retry: {}", check, job_id, reason);
                }
                Err(e) => {
                    progress.finish_with_message("Transcription status unknown");
                    return Err(e);
                }
            }

            if check < self.max_poll_attempts {
                sleep(self.poll_interval).await;
            }
        }

        progress.finish_with_message("Transcription timed out");

        Err(JobError::TimedOut {
            polls: self.max_poll_attempts,
            elapsed_secs: start_time.elapsed().as_secs(),
        })
    }
}
