use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "transcriptor",
    about = "YT Transcriptor - Fetch YouTube transcripts with multi-strategy fallback",
    version,
    long_about = "Retrieves caption text for a YouTube video by trying an ordered list of caption strategies with retries, language negotiation and request fingerprinting, falling back to an asynchronous transcription job when no captions can be fetched."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// API key for the transcription job fallback
    #[arg(long, global = true, env = "TRANSCRIPT_JOB_API_KEY", hide_env_values = true)]
    pub job_api_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the transcript of a YouTube video
    Transcribe {
        /// YouTube video URL (youtube.com or youtu.be)
        #[arg(value_name = "URL")]
        url: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Wall-clock budget in seconds (overrides the configured budget)
        #[arg(long, value_name = "SECS")]
        budget: Option<u64>,

        /// Never fall back to the transcription job
        #[arg(long)]
        no_job_fallback: bool,
    },

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List the configured acquisition strategies in fallback order
    Strategies,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain transcript text
    Text,
    /// JSON with source metadata
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_transcribe() {
        let cli = Cli::try_parse_from([
            "transcriptor",
            "transcribe",
            "https://youtu.be/dQw4w9WgXcQ",
            "--format",
            "json",
            "--budget",
            "120",
            "--no-job-fallback",
        ])
        .unwrap();

        match cli.command {
            Commands::Transcribe {
                url,
                format,
                budget,
                no_job_fallback,
                output,
            } => {
                assert_eq!(url, "https://youtu.be/dQw4w9WgXcQ");
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(budget, Some(120));
                assert!(no_job_fallback);
                assert!(output.is_none());
            }
            _ => panic!("expected transcribe command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["transcriptor", "strategies", "--config", "custom.yaml", "-v"]).unwrap();

        assert!(matches!(cli.command, Commands::Strategies));
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        assert!(cli.verbose);
    }
}
