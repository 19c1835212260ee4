use anyhow::Result;
use clap::Parser;
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt_transcriptor::cli::{Cli, Commands};
use yt_transcriptor::config::Config;
use yt_transcriptor::output;
use yt_transcriptor::transcribe::AcquisitionEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "yt_transcriptor=debug"
    } else {
        "yt_transcriptor=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path).await?,
        None => Config::load().await?,
    };

    if let Some(api_key) = cli.job_api_key.clone() {
        config.transcription_job.api_key = Some(api_key);
    }

    match cli.command {
        Commands::Transcribe {
            url,
            output,
            format,
            budget,
            no_job_fallback,
        } => {
            if let Some(budget) = budget {
                config.engine.budget_secs = budget;
            }
            if no_job_fallback {
                config.transcription_job.enabled = false;
            }

            let engine = AcquisitionEngine::new(&config, !cli.quiet).await?;

            tracing::info!("Starting transcript acquisition for URL: {}", url);

            let result = match engine.acquire_transcript(&url).await {
                Ok(result) => result,
                Err(err) => {
                    eprintln!(
                        "{} {}",
                        style(format!("error[{}]:", err.code())).red().bold(),
                        err
                    );
                    if err.is_retryable_later() {
                        eprintln!("{}", style("This failure is usually temporary; retry later.").yellow());
                    }
                    std::process::exit(1);
                }
            };

            match output {
                Some(path) => {
                    output::save_to_file(&result, &path, &format).await?;
                    println!(
                        "Transcript saved to: {} (via {})",
                        path.display(),
                        result.source_method
                    );
                }
                None => {
                    output::print_to_console(&result, &format)?;
                }
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                match &cli.config {
                    Some(path) => {
                        config.save_to(path).await?;
                        println!("Configuration written to: {}", path.display());
                    }
                    None => {
                        config.save().await?;
                        println!("Configuration written to: {}", Config::config_path()?.display());
                    }
                }
            }
        }
        Commands::Strategies => {
            println!("Acquisition strategies (in fallback order):");
            for (index, strategy) in config.acquisition_strategies().iter().enumerate() {
                println!(
                    "  {}. {} ({} attempts, {}ms base delay, {})",
                    index + 1,
                    strategy.name,
                    strategy.retry_count,
                    strategy.base_delay.as_millis(),
                    if strategy.uses_alternate_endpoint {
                        "direct timed-text endpoint"
                    } else {
                        "caption library"
                    }
                );
            }
            if config.job_fallback_ready() {
                println!("  then: transcription job ({})", config.transcription_job.base_url);
            }
        }
    }

    Ok(())
}
