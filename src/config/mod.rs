use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::transcribe::normalize::{TextLimits, DEFAULT_MAX_CHARS, DEFAULT_MIN_CHARS};
use crate::transcribe::{AcquisitionStrategy, EngineSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Orchestrator settings
    pub engine: EngineConfig,

    /// Ordered fallback policy
    pub strategies: Vec<StrategyConfig>,

    /// Caption surface settings
    pub youtube: YoutubeConfig,

    /// Asynchronous transcription job API
    pub transcription_job: TranscriptionJobConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Candidate languages, tried in order by language-sensitive strategies
    pub languages: Vec<String>,

    /// Upper bound of the random delay added to each retry backoff
    pub max_jitter_ms: u64,

    /// Wall-clock budget for one acquisition
    pub budget_secs: u64,

    /// Shortest transcript accepted
    pub min_chars: usize,

    /// Transcripts are clipped to this many characters
    pub max_chars: usize,

    /// Fixed seed for backoff jitter and request fingerprints (reproducible runs)
    pub jitter_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,

    /// Attempts allowed for this strategy, including the first
    pub retry_count: u32,

    /// Base delay before each retry
    pub base_delay_ms: u64,

    /// Use the direct timed-text endpoint instead of the caption library
    pub uses_alternate_endpoint: bool,

    /// Walk the language list on each attempt
    pub language_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    /// Caption surface base URL
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Optional outbound proxy for caption requests
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionJobConfig {
    /// Enable the job fallback when direct caption retrieval fails
    pub enabled: bool,

    /// Job API base URL; the service must speak the `{video_url}` submit and `status` poll contract
    pub base_url: String,

    /// API key; usually supplied through TRANSCRIPT_JOB_API_KEY instead of the file
    pub api_key: Option<String>,

    /// Delay between status checks
    pub poll_interval_secs: u64,

    /// Status checks before the job is reported as timed out
    pub max_poll_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                languages: vec![
                    "en".to_string(),
                    "en-US".to_string(),
                    "en-GB".to_string(),
                    "auto".to_string(),
                ],
                max_jitter_ms: 2_000,
                budget_secs: 600,
                min_chars: DEFAULT_MIN_CHARS,
                max_chars: DEFAULT_MAX_CHARS,
                jitter_seed: None,
            },
            strategies: vec![
                StrategyConfig {
                    name: "caption-library".to_string(),
                    retry_count: 3,
                    base_delay_ms: 2_000,
                    uses_alternate_endpoint: false,
                    language_sensitive: true,
                },
                StrategyConfig {
                    name: "direct-timedtext".to_string(),
                    retry_count: 2,
                    base_delay_ms: 3_000,
                    uses_alternate_endpoint: true,
                    language_sensitive: true,
                },
            ],
            youtube: YoutubeConfig {
                base_url: "https://www.youtube.com".to_string(),
                request_timeout_secs: 30,
                proxy: None,
            },
            transcription_job: TranscriptionJobConfig {
                enabled: true,
                base_url: "http://localhost:8080".to_string(),
                api_key: None,
                poll_interval_secs: 3,
                max_poll_attempts: 100,
            },
        }
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults on first run
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path).await
        } else {
            let config = Self::default();
            config.save_to(&config_path).await?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit path; a missing file yields defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?).await
    }

    /// Save configuration to an explicit path
    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("yt-transcriptor").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.strategies.is_empty() {
            anyhow::bail!("At least one acquisition strategy must be configured");
        }

        for strategy in &self.strategies {
            if strategy.name.trim().is_empty() {
                anyhow::bail!("Acquisition strategies must be named");
            }
            if strategy.retry_count == 0 {
                anyhow::bail!("Strategy '{}' must allow at least one attempt", strategy.name);
            }
        }

        if self.engine.languages.iter().all(|l| l.trim().is_empty()) {
            anyhow::bail!("At least one candidate language must be configured");
        }

        if self.engine.max_chars == 0 || self.engine.min_chars > self.engine.max_chars {
            anyhow::bail!(
                "Invalid transcript length bounds: min {} / max {}",
                self.engine.min_chars,
                self.engine.max_chars
            );
        }

        if self.engine.budget_secs == 0 {
            anyhow::bail!("Acquisition budget must be greater than zero");
        }

        validate_base_url("youtube.base_url", &self.youtube.base_url)?;

        if self.transcription_job.enabled {
            validate_base_url("transcription_job.base_url", &self.transcription_job.base_url)?;

            if self.transcription_job.max_poll_attempts == 0 {
                anyhow::bail!("transcription_job.max_poll_attempts must be greater than zero");
            }
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Languages: {}", self.engine.languages.join(", "));
        println!("  Budget: {}s", self.engine.budget_secs);
        println!("  Max Characters: {}", self.engine.max_chars);
        println!("  Caption Surface: {}", self.youtube.base_url);
        if let Some(proxy) = &self.youtube.proxy {
            println!("  Proxy: {}", proxy);
        }
        println!("  Strategies:");
        for strategy in &self.strategies {
            println!(
                "    • {} ({} attempts, {}ms base delay)",
                strategy.name, strategy.retry_count, strategy.base_delay_ms
            );
        }
        println!(
            "  Job Fallback: {} ({})",
            if self.job_fallback_ready() { "enabled" } else { "disabled" },
            self.transcription_job.base_url
        );
    }

    /// Whether the job fallback is enabled and has credentials
    pub fn job_fallback_ready(&self) -> bool {
        self.transcription_job.enabled
            && self
                .transcription_job
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty())
    }

    /// Ordered strategies for the orchestrator
    pub fn acquisition_strategies(&self) -> Vec<AcquisitionStrategy> {
        self.strategies
            .iter()
            .map(|s| AcquisitionStrategy {
                name: s.name.clone(),
                retry_count: s.retry_count,
                base_delay: Duration::from_millis(s.base_delay_ms),
                uses_alternate_endpoint: s.uses_alternate_endpoint,
                language_sensitive: s.language_sensitive,
            })
            .collect()
    }

    /// Orchestrator settings
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            languages: self
                .engine
                .languages
                .iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            max_jitter: Duration::from_millis(self.engine.max_jitter_ms),
            budget: Duration::from_secs(self.engine.budget_secs),
            limits: TextLimits {
                min_chars: self.engine.min_chars,
                max_chars: self.engine.max_chars,
            },
            jitter_seed: self.engine.jitter_seed,
        }
    }
}

fn validate_base_url(field: &str, value: &str) -> Result<()> {
    let parsed = Url::parse(value)
        .with_context(|| format!("{} is not a valid URL: {}", field, value))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{} must use HTTP or HTTPS protocol", field);
    }

    Ok(())
}
