use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::extractors::{
    build_http_client, AttemptScope, CaptionLibraryClient, CaptionSource, DirectEndpointClient,
    FetchError, RequestFingerprint, VideoId, AUTO_LANGUAGE,
};
use crate::TranscriptError;

pub mod classifier;
pub mod normalize;
pub mod processor;

use classifier::{classify, ErrorClass};
use normalize::{normalize, TextLimits};
use processor::{HttpJobApi, JobError, TranscriptionJobProcessor};

/// `source_method` reported when the transcription job produced the text
pub const JOB_SOURCE: &str = "transcription-job";

/// One acquisition method with its own retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionStrategy {
    pub name: String,
    pub retry_count: u32,
    pub base_delay: Duration,
    pub uses_alternate_endpoint: bool,
    pub language_sensitive: bool,
}

/// Orchestrator settings, fixed for the lifetime of an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub languages: Vec<String>,
    pub max_jitter: Duration,
    pub budget: Duration,
    pub limits: TextLimits,
    pub jitter_seed: Option<u64>,
}

impl EngineSettings {
    /// Fresh RNG for one acquisition; seeded runs are reproducible
    fn rng(&self) -> StdRng {
        match self.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Successful acquisition
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptResult {
    /// Normalized transcript text
    pub text: String,

    /// Strategy name, or `transcription-job` for the fallback
    pub source_method: String,

    pub video_id: String,

    /// Index of the winning strategy; `None` when the job fallback produced the text
    pub strategy_index: Option<usize>,

    /// 1-based attempt of the winning strategy that produced the text
    pub strategy_attempt: Option<u32>,

    /// Upstream caption fetches made during the call
    pub attempts: usize,

    pub retrieved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    Failure { class: ErrorClass, message: String },
}

/// One upstream fetch, kept only for logging and decisions within a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub strategy_name: String,
    pub attempt_index: u32,
    pub language_tried: String,
    pub outcome: AttemptOutcome,
}

impl AttemptRecord {
    fn new(
        strategy: &AcquisitionStrategy,
        attempt_index: u32,
        language: &str,
        result: Result<String, FetchError>,
    ) -> Self {
        let outcome = match result {
            Ok(text) if !text.trim().is_empty() => AttemptOutcome::Success(text),
            Ok(_) => AttemptOutcome::Failure {
                class: ErrorClass::NotFound,
                message: "caption source returned an empty transcript".to_string(),
            },
            Err(error) => AttemptOutcome::Failure {
                class: classify(&error),
                message: error.to_string(),
            },
        };

        Self {
            strategy_name: strategy.name.clone(),
            attempt_index,
            language_tried: language.to_string(),
            outcome,
        }
    }

    fn failure_class(&self) -> Option<ErrorClass> {
        match &self.outcome {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::Failure { class, .. } => Some(*class),
        }
    }

    fn log(&self) {
        match &self.outcome {
            AttemptOutcome::Success(text) => tracing::info!(
                strategy = %self.strategy_name,
                attempt = self.attempt_index + 1,
                language = %self.language_tried,
                chars = text.chars().count(),
                "Caption fetch succeeded"
            ),
            AttemptOutcome::Failure { class, message } => tracing::warn!(
                strategy = %self.strategy_name,
                attempt = self.attempt_index + 1,
                language = %self.language_tried,
                class = %class,
                "Caption fetch failed: {}",
                message
            ),
        }
    }
}

/// What the orchestrator does after a failed fetch
enum Step {
    NextLanguage,
    /// Try the remaining languages, then back off and retry the attempt
    RetryLater,
    NextStrategy,
    Abort(TranscriptError),
}

impl Step {
    fn after(class: ErrorClass, message: &str) -> Self {
        match class {
            ErrorClass::Disabled => Step::Abort(TranscriptError::Disabled(message.to_string())),
            ErrorClass::Unavailable => Step::Abort(TranscriptError::Unavailable(message.to_string())),
            ErrorClass::NotFound => Step::NextLanguage,
            ErrorClass::RateLimitedOrBlocked | ErrorClass::Transient => Step::RetryLater,
            ErrorClass::Unknown => Step::NextStrategy,
        }
    }
}

/// Walks the fallback policy for one video at a time.
///
/// Holds no per-call state, so one engine can serve concurrent acquisitions.
pub struct AcquisitionEngine {
    settings: EngineSettings,
    strategies: Vec<AcquisitionStrategy>,
    library: Arc<dyn CaptionSource>,
    direct: Arc<dyn CaptionSource>,
    jobs: Option<TranscriptionJobProcessor>,
}

impl AcquisitionEngine {
    /// Build the engine and its HTTP clients from configuration
    pub async fn new(config: &Config, show_progress: bool) -> Result<Self> {
        config.validate()?;

        let client = build_http_client(&config.youtube)?;
        let library = Arc::new(CaptionLibraryClient::new(client.clone(), &config.youtube.base_url));
        let direct = Arc::new(DirectEndpointClient::new(client, &config.youtube.base_url));

        let jobs = match config.transcription_job.api_key.as_deref() {
            Some(api_key) if config.job_fallback_ready() => {
                let job_client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(60))
                    .connect_timeout(Duration::from_secs(10))
                    .build()
                    .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
                let api = HttpJobApi::new(job_client, &config.transcription_job.base_url, api_key);

                Some(
                    TranscriptionJobProcessor::new(
                        Arc::new(api),
                        Duration::from_secs(config.transcription_job.poll_interval_secs),
                        config.transcription_job.max_poll_attempts,
                    )
                    .with_progress(show_progress),
                )
            }
            _ => {
                tracing::debug!("Transcription job fallback disabled");
                None
            }
        };

        Self::from_parts(
            config.engine_settings(),
            config.acquisition_strategies(),
            library,
            direct,
            jobs,
        )
    }

    /// Assemble an engine from already-built sources
    pub fn from_parts(
        settings: EngineSettings,
        strategies: Vec<AcquisitionStrategy>,
        library: Arc<dyn CaptionSource>,
        direct: Arc<dyn CaptionSource>,
        jobs: Option<TranscriptionJobProcessor>,
    ) -> Result<Self> {
        if strategies.is_empty() {
            anyhow::bail!("At least one acquisition strategy is required");
        }
        if let Some(strategy) = strategies.iter().find(|s| s.retry_count == 0) {
            anyhow::bail!("Strategy '{}' must allow at least one attempt", strategy.name);
        }
        if settings.languages.is_empty() {
            anyhow::bail!("At least one candidate language is required");
        }
        if settings.limits.min_chars > settings.limits.max_chars {
            anyhow::bail!("Minimum transcript length exceeds the maximum");
        }

        Ok(Self {
            settings,
            strategies,
            library,
            direct,
            jobs,
        })
    }

    pub fn strategies(&self) -> &[AcquisitionStrategy] {
        &self.strategies
    }

    /// Most upstream calls one acquisition can make: every strategy attempt
    /// across every language, plus the job submission and its status checks
    pub fn max_upstream_calls(&self) -> usize {
        let caption_calls: usize = self
            .strategies
            .iter()
            .map(|s| s.retry_count as usize * self.languages_for(s).len())
            .sum();
        let job_calls = self
            .jobs
            .as_ref()
            .map(|jobs| 1 + jobs.max_poll_attempts() as usize)
            .unwrap_or(0);

        caption_calls + job_calls
    }

    /// Acquire the transcript for a video URL within the configured budget.
    ///
    /// The URL is validated before any network call.
    pub async fn acquire_transcript(&self, video_url: &str) -> Result<TranscriptResult, TranscriptError> {
        let video_id = VideoId::from_url(video_url)?;
        self.acquire_within(&video_id, self.settings.budget).await
    }

    /// Acquire, giving up with `TimedOut` once `budget` elapses
    pub async fn acquire_within(
        &self,
        video_id: &VideoId,
        budget: Duration,
    ) -> Result<TranscriptResult, TranscriptError> {
        match tokio::time::timeout(budget, self.acquire(video_id)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Acquisition for {} exceeded its {:?} budget", video_id, budget);
                Err(TranscriptError::TimedOut(format!(
                    "acquisition exceeded its {}s budget",
                    budget.as_secs_f64()
                )))
            }
        }
    }

    /// Run the fallback policy for one video
    pub async fn acquire(&self, video_id: &VideoId) -> Result<TranscriptResult, TranscriptError> {
        let span = tracing::info_span!("acquire", video_id = %video_id, request_id = %Uuid::new_v4());
        self.run(video_id).instrument(span).await
    }

    async fn run(&self, video_id: &VideoId) -> Result<TranscriptResult, TranscriptError> {
        let mut rng = self.settings.rng();
        let mut records: Vec<AttemptRecord> = Vec::new();

        'strategies: for (strategy_index, strategy) in self.strategies.iter().enumerate() {
            let source = self.source_for(strategy);
            let languages = self.languages_for(strategy);

            tracing::info!(
                "Trying strategy '{}' ({} attempts, languages: {})",
                strategy.name,
                strategy.retry_count,
                languages.join(", ")
            );

            for attempt_index in 0..strategy.retry_count {
                if attempt_index > 0 {
                    let delay = self.backoff_delay(strategy, &mut rng);
                    tracing::info!(
                        "Retrying strategy '{}' in {}ms (attempt {}/{})",
                        strategy.name,
                        delay.as_millis(),
                        attempt_index + 1,
                        strategy.retry_count
                    );
                    sleep(delay).await;
                }

                let fingerprint = RequestFingerprint::from_seed(rng.gen());
                let scope = AttemptScope::new();
                let mut retry_wanted = false;

                for language in &languages {
                    let result = source.fetch(video_id, language, &fingerprint, &scope).await;
                    let record = AttemptRecord::new(strategy, attempt_index, language, result);
                    record.log();

                    let step = match &record.outcome {
                        AttemptOutcome::Success(text) => {
                            return self.finish(
                                video_id,
                                text,
                                &strategy.name,
                                Some(strategy_index),
                                Some(attempt_index + 1),
                                records.len() + 1,
                            );
                        }
                        AttemptOutcome::Failure { class, message } => Step::after(*class, message),
                    };
                    records.push(record);

                    match step {
                        Step::NextLanguage => {}
                        Step::RetryLater => retry_wanted = true,
                        Step::NextStrategy => continue 'strategies,
                        Step::Abort(error) => return Err(error),
                    }
                }

                if !retry_wanted {
                    tracing::info!("Strategy '{}' found no transcript in any language", strategy.name);
                    continue 'strategies;
                }
            }

            tracing::warn!("Strategy '{}' exhausted its {} attempts", strategy.name, strategy.retry_count);
        }

        self.fall_back_to_job(video_id, &records).await
    }

    async fn fall_back_to_job(
        &self,
        video_id: &VideoId,
        records: &[AttemptRecord],
    ) -> Result<TranscriptResult, TranscriptError> {
        let throttled = records
            .iter()
            .any(|r| r.failure_class() == Some(ErrorClass::RateLimitedOrBlocked));

        let Some(jobs) = &self.jobs else {
            return Err(exhausted_error(
                records.len(),
                throttled,
                "transcription job fallback is not configured",
            ));
        };

        tracing::info!(
            "All caption strategies failed after {} attempts, falling back to transcription job",
            records.len()
        );

        match jobs.transcribe(&video_id.watch_url()).await {
            Ok(text) => self.finish(video_id, &text, JOB_SOURCE, None, None, records.len()),
            Err(JobError::TimedOut { polls, elapsed_secs }) => Err(TranscriptError::TimedOut(format!(
                "transcription job still running after {} status checks ({}s)",
                polls, elapsed_secs
            ))),
            Err(error) => {
                tracing::warn!("Transcription job fallback failed: {}", error);
                Err(exhausted_error(records.len(), throttled, &error.to_string()))
            }
        }
    }

    fn finish(
        &self,
        video_id: &VideoId,
        raw_text: &str,
        source_method: &str,
        strategy_index: Option<usize>,
        strategy_attempt: Option<u32>,
        attempts: usize,
    ) -> Result<TranscriptResult, TranscriptError> {
        let text = normalize(raw_text, &self.settings.limits)?;

        tracing::info!(
            "Transcript acquired via '{}' ({} characters, {} attempts)",
            source_method,
            text.chars().count(),
            attempts
        );

        Ok(TranscriptResult {
            text,
            source_method: source_method.to_string(),
            video_id: video_id.to_string(),
            strategy_index,
            strategy_attempt,
            attempts,
            retrieved_at: Utc::now(),
        })
    }

    fn source_for(&self, strategy: &AcquisitionStrategy) -> &dyn CaptionSource {
        if strategy.uses_alternate_endpoint {
            self.direct.as_ref()
        } else {
            self.library.as_ref()
        }
    }

    fn languages_for(&self, strategy: &AcquisitionStrategy) -> Vec<&str> {
        if strategy.language_sensitive {
            self.settings.languages.iter().map(String::as_str).collect()
        } else {
            vec![AUTO_LANGUAGE]
        }
    }

    /// `base_delay` plus jitter drawn from [0, max_jitter)
    fn backoff_delay(&self, strategy: &AcquisitionStrategy, rng: &mut StdRng) -> Duration {
        let max_jitter_ms = self.settings.max_jitter.as_millis() as u64;
        let jitter_ms = if max_jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..max_jitter_ms)
        };

        strategy.base_delay + Duration::from_millis(jitter_ms)
    }
}

fn exhausted_error(attempts: usize, throttled: bool, detail: &str) -> TranscriptError {
    if throttled {
        TranscriptError::RateLimited(format!(
            "caption requests were throttled or blocked across {} attempts; {}",
            attempts, detail
        ))
    } else {
        TranscriptError::Unknown(format!(
            "no strategy produced a transcript after {} attempts; captions may not exist or access is restricted ({})",
            attempts, detail
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{CaptionLibraryError, DirectEndpointError, MockCaptionSource};
    use crate::transcribe::processor::{AsyncJob, JobStatus, MockJobApi};
    use async_trait::async_trait;

    const VIDEO: &str = "dQw4w9WgXcQ";

    fn video_id() -> VideoId {
        VideoId::new(VIDEO).unwrap()
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            languages: vec!["en".into(), "en-US".into(), "en-GB".into(), "auto".into()],
            max_jitter: Duration::ZERO,
            budget: Duration::from_secs(30),
            limits: TextLimits::default(),
            jitter_seed: Some(42),
        }
    }

    fn strategy(name: &str, retry_count: u32, uses_alternate_endpoint: bool) -> AcquisitionStrategy {
        AcquisitionStrategy {
            name: name.to_string(),
            retry_count,
            base_delay: Duration::ZERO,
            uses_alternate_endpoint,
            language_sensitive: true,
        }
    }

    fn default_strategies() -> Vec<AcquisitionStrategy> {
        vec![strategy("caption-library", 3, false), strategy("direct-timedtext", 2, true)]
    }

    fn engine_with(
        settings: EngineSettings,
        library: MockCaptionSource,
        direct: MockCaptionSource,
        jobs: Option<MockJobApi>,
    ) -> AcquisitionEngine {
        let jobs = jobs.map(|api| TranscriptionJobProcessor::new(Arc::new(api), Duration::ZERO, 100));
        AcquisitionEngine::from_parts(
            settings,
            default_strategies(),
            Arc::new(library),
            Arc::new(direct),
            jobs,
        )
        .unwrap()
    }

    fn engine(
        library: MockCaptionSource,
        direct: MockCaptionSource,
        jobs: Option<MockJobApi>,
    ) -> AcquisitionEngine {
        engine_with(settings(), library, direct, jobs)
    }

    fn not_found() -> FetchError {
        FetchError::Library(CaptionLibraryError::NoTranscriptFound {
            video_id: VIDEO.to_string(),
            language: "en".to_string(),
        })
    }

    fn transient() -> FetchError {
        FetchError::Other("no element found: line 1, column 0".to_string())
    }

    fn untouched() -> MockCaptionSource {
        let mut source = MockCaptionSource::new();
        source.expect_fetch().never();
        source
    }

    fn never_finds_anything() -> MockCaptionSource {
        let mut source = MockCaptionSource::new();
        source.expect_fetch().times(4).returning(|_, _, _, _| Err(not_found()));
        source
    }

    fn job_completing_with(text: &'static str) -> MockJobApi {
        let mut api = MockJobApi::new();
        api.expect_submit()
            .times(1)
            .returning(|_| Ok("job-1".to_string()));
        api.expect_status().times(1).returning(move |_| {
            Ok(AsyncJob {
                job_id: "job-1".to_string(),
                status: JobStatus::Completed,
                text: Some(text.to_string()),
                error: None,
            })
        });
        api
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let mut library = MockCaptionSource::new();
        library
            .expect_fetch()
            .withf(|_, language, _, _| language == "en")
            .times(1)
            .returning(|_, _, _, _| Ok("Never gonna give you up".to_string()));

        let result = engine(library, untouched(), None).acquire(&video_id()).await.unwrap();

        assert_eq!(result.text, "Never gonna give you up");
        assert_eq!(result.source_method, "caption-library");
        assert_eq!(result.strategy_index, Some(0));
        assert_eq!(result.strategy_attempt, Some(1));
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_disabled_is_terminal_after_one_attempt() {
        let mut library = MockCaptionSource::new();
        library.expect_fetch().times(1).returning(|_, _, _, _| {
            Err(FetchError::Library(CaptionLibraryError::TranscriptsDisabled(
                VIDEO.to_string(),
            )))
        });

        let mut jobs = MockJobApi::new();
        jobs.expect_submit().never();

        let err = engine(library, untouched(), Some(jobs))
            .acquire(&video_id())
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptError::Disabled(_)));
    }

    #[tokio::test]
    async fn test_unavailable_is_terminal() {
        let mut library = MockCaptionSource::new();
        library.expect_fetch().times(1).returning(|_, _, _, _| {
            Err(FetchError::Library(CaptionLibraryError::VideoUnavailable(
                VIDEO.to_string(),
            )))
        });

        let err = engine(library, untouched(), None)
            .acquire(&video_id())
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_transient_errors_retry_then_succeed() {
        let mut library = MockCaptionSource::new();
        let mut calls = 0;
        library
            .expect_fetch()
            .withf(|_, language, _, _| language == "en")
            .times(3)
            .returning(move |_, _, _, _| {
                calls += 1;
                if calls < 3 {
                    Err(transient())
                } else {
                    Ok("Hello world".to_string())
                }
            });
        library
            .expect_fetch()
            .withf(|_, language, _, _| language != "en")
            .times(6)
            .returning(|_, _, _, _| Err(not_found()));

        let result = engine(library, untouched(), None).acquire(&video_id()).await.unwrap();

        assert_eq!(result.text, "Hello world");
        assert_eq!(result.strategy_index, Some(0));
        assert_eq!(result.strategy_attempt, Some(3));
        assert_eq!(result.attempts, 9);
    }

    #[tokio::test]
    async fn test_single_language_transient_retries_count_three_fetches() {
        let mut library = MockCaptionSource::new();
        let mut calls = 0;
        library.expect_fetch().times(3).returning(move |_, _, _, _| {
            calls += 1;
            if calls < 3 {
                Err(transient())
            } else {
                Ok("Hello world".to_string())
            }
        });

        let settings = EngineSettings {
            languages: vec!["en".into()],
            ..settings()
        };
        let result = engine_with(settings, library, untouched(), None)
            .acquire(&video_id())
            .await
            .unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(result.strategy_index, Some(0));
    }

    #[tokio::test]
    async fn test_failing_language_does_not_hide_later_languages() {
        let mut direct = MockCaptionSource::new();
        direct
            .expect_fetch()
            .withf(|_, language, _, _| language == "en" || language == "en-US")
            .times(2)
            .returning(|_, language, _, _| {
                Err(FetchError::Direct(DirectEndpointError {
                    video_id: VIDEO.to_string(),
                    reason: format!("no caption track for language {} in watch page", language),
                }))
            });
        direct
            .expect_fetch()
            .withf(|_, language, _, _| language == "en-GB")
            .times(1)
            .returning(|_, _, _, _| Ok("british english captions".to_string()));

        let result = engine(never_finds_anything(), direct, None)
            .acquire(&video_id())
            .await
            .unwrap();

        assert_eq!(result.text, "british english captions");
        assert_eq!(result.source_method, "direct-timedtext");
        assert_eq!(result.strategy_attempt, Some(1));
    }

    #[tokio::test]
    async fn test_not_found_walks_languages_then_next_strategy() {
        let mut direct = MockCaptionSource::new();
        direct
            .expect_fetch()
            .withf(|_, language, _, _| language == "en")
            .times(1)
            .returning(|_, _, _, _| Ok("direct endpoint captions".to_string()));

        let result = engine(never_finds_anything(), direct, None)
            .acquire(&video_id())
            .await
            .unwrap();

        assert_eq!(result.source_method, "direct-timedtext");
        assert_eq!(result.strategy_index, Some(1));
        assert_eq!(result.attempts, 5);
    }

    #[tokio::test]
    async fn test_empty_text_moves_to_next_language() {
        let mut library = MockCaptionSource::new();
        library
            .expect_fetch()
            .withf(|_, language, _, _| language == "en")
            .times(1)
            .returning(|_, _, _, _| Ok("   ".to_string()));
        library
            .expect_fetch()
            .withf(|_, language, _, _| language == "en-US")
            .times(1)
            .returning(|_, _, _, _| Ok("american english captions".to_string()));

        let result = engine(library, untouched(), None).acquire(&video_id()).await.unwrap();
        assert_eq!(result.text, "american english captions");
    }

    #[tokio::test]
    async fn test_unknown_error_advances_without_retry() {
        let mut library = MockCaptionSource::new();
        library.expect_fetch().times(1).returning(|_, _, _, _| {
            Err(FetchError::Library(CaptionLibraryError::AgeRestricted(
                VIDEO.to_string(),
            )))
        });

        let mut direct = MockCaptionSource::new();
        direct
            .expect_fetch()
            .times(1)
            .returning(|_, _, _, _| Ok("fallback captions".to_string()));

        let result = engine(library, direct, None).acquire(&video_id()).await.unwrap();
        assert_eq!(result.source_method, "direct-timedtext");
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_all_not_found_falls_back_to_job() {
        let result = engine(
            never_finds_anything(),
            never_finds_anything(),
            Some(job_completing_with("  spoken   words  ")),
        )
        .acquire(&video_id())
        .await
        .unwrap();

        assert_eq!(result.text, "spoken words");
        assert_eq!(result.source_method, JOB_SOURCE);
        assert_eq!(result.strategy_index, None);
        assert_eq!(result.strategy_attempt, None);
    }

    #[tokio::test]
    async fn test_job_poll_ceiling_is_timed_out_not_failed() {
        let mut jobs = MockJobApi::new();
        jobs.expect_submit()
            .times(1)
            .returning(|_| Ok("job-1".to_string()));
        jobs.expect_status().times(100).returning(|_| {
            Ok(AsyncJob {
                job_id: "job-1".to_string(),
                status: JobStatus::Processing,
                text: None,
                error: None,
            })
        });

        let err = engine(never_finds_anything(), never_finds_anything(), Some(jobs))
            .acquire(&video_id())
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptError::TimedOut(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_failed_job_reports_unknown() {
        let mut jobs = MockJobApi::new();
        jobs.expect_submit()
            .times(1)
            .returning(|_| Err(JobError::Submit("HTTP 401".to_string())));

        let err = engine(never_finds_anything(), never_finds_anything(), Some(jobs))
            .acquire(&video_id())
            .await
            .unwrap_err();

        match err {
            TranscriptError::Unknown(message) => {
                assert!(message.contains("captions may not exist or access is restricted"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_are_bounded_and_throttling_surfaces() {
        let mut library = MockCaptionSource::new();
        library
            .expect_fetch()
            .times(12)
            .returning(|_, _, _, _| Err(FetchError::Other("HTTP 429 Too Many Requests".to_string())));
        let mut direct = MockCaptionSource::new();
        direct.expect_fetch().times(8).returning(|_, _, _, _| Err(transient()));

        let engine = engine(library, direct, None);
        assert_eq!(engine.max_upstream_calls(), 20);

        let err = engine.acquire(&video_id()).await.unwrap_err();
        assert!(matches!(err, TranscriptError::RateLimited(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_language_insensitive_strategy_only_tries_auto() {
        let mut library = MockCaptionSource::new();
        library
            .expect_fetch()
            .withf(|_, language, _, _| language == AUTO_LANGUAGE)
            .times(1)
            .returning(|_, _, _, _| Ok("any track will do".to_string()));

        let strategies = vec![AcquisitionStrategy {
            language_sensitive: false,
            ..strategy("caption-library-any", 1, false)
        }];
        let engine = AcquisitionEngine::from_parts(
            settings(),
            strategies,
            Arc::new(library),
            Arc::new(untouched()),
            None,
        )
        .unwrap();

        let result = engine.acquire(&video_id()).await.unwrap();
        assert_eq!(result.text, "any track will do");
    }

    #[tokio::test]
    async fn test_too_short_transcript_is_rejected() {
        let mut library = MockCaptionSource::new();
        library.expect_fetch().times(1).returning(|_, _, _, _| Ok("hi".to_string()));

        let err = engine(library, untouched(), None)
            .acquire(&video_id())
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptError::Validation(_)));
    }

    #[tokio::test]
    async fn test_malformed_url_makes_no_calls() {
        let mut jobs = MockJobApi::new();
        jobs.expect_submit().never();
        jobs.expect_status().never();

        let err = engine(untouched(), untouched(), Some(jobs))
            .acquire_transcript("not-a-url")
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptError::InvalidInput(_)));
        assert_eq!(err.status_code(), 400);
    }

    struct StalledSource;

    #[async_trait]
    impl CaptionSource for StalledSource {
        async fn fetch(
            &self,
            _video_id: &VideoId,
            _language: &str,
            _fingerprint: &RequestFingerprint,
            _scope: &AttemptScope,
        ) -> Result<String, FetchError> {
            sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_budget_exceeded_times_out() {
        let engine = AcquisitionEngine::from_parts(
            settings(),
            default_strategies(),
            Arc::new(StalledSource),
            Arc::new(StalledSource),
            None,
        )
        .unwrap();

        let err = engine
            .acquire_within(&video_id(), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptError::TimedOut(_)));
    }

    #[test]
    fn test_backoff_jitter_is_seeded_and_bounded() {
        let mut settings = settings();
        settings.max_jitter = Duration::from_secs(2);
        let engine = AcquisitionEngine::from_parts(
            settings,
            default_strategies(),
            Arc::new(StalledSource),
            Arc::new(StalledSource),
            None,
        )
        .unwrap();
        let strategy = AcquisitionStrategy {
            base_delay: Duration::from_secs(1),
            ..strategy("s", 2, false)
        };

        let draw = |engine: &AcquisitionEngine| {
            let mut rng = engine.settings.rng();
            (0..20)
                .map(|_| engine.backoff_delay(&strategy, &mut rng))
                .collect::<Vec<_>>()
        };

        let first = draw(&engine);
        assert_eq!(first, draw(&engine));
        for delay in first {
            assert!(delay >= Duration::from_secs(1));
            assert!(delay < Duration::from_secs(3));
        }
    }

    #[test]
    fn test_invalid_parts_fail_loudly() {
        let result = AcquisitionEngine::from_parts(
            settings(),
            vec![strategy("broken", 0, false)],
            Arc::new(StalledSource),
            Arc::new(StalledSource),
            None,
        );
        assert!(result.is_err());

        let result = AcquisitionEngine::from_parts(
            settings(),
            Vec::new(),
            Arc::new(StalledSource),
            Arc::new(StalledSource),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_engine_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AcquisitionEngine>();
    }
}
