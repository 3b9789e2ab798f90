
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use storereviews::{ConflictRetryPolicy, ReviewConfig};
use tracing_subscriber::EnvFilter;

use crate::load_test::{LoadTestConfig, run_load_test};

#[derive(Parser)]
#[command(name = "storereviews")]
#[command(about = "Concurrent review submission simulator for the store rating aggregate")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "error")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit reviews concurrently against an in-memory store and verify
    /// that every store aggregate matches its reviews
    Simulate {
        #[arg(long, default_value_t = 4)]
        stores: usize,
        #[arg(long, default_value_t = 100)]
        reviews_per_store: usize,
        #[arg(long, default_value_t = 32)]
        concurrency: usize,
        #[arg(long, default_value_t = 0x9e3779b97f4a7c15)]
        seed: u64,
        /// Override `conflict_retry.max_attempts`
        #[arg(long)]
        max_attempts: Option<usize>,
        /// JSON file with a `ReviewConfig`
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as JSON
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Command::Simulate {
            stores,
            reviews_per_store,
            concurrency,
            seed,
            max_attempts,
            config,
            json,
        } => {
            let mut review = load_config(config.as_ref())?;
            if let Some(attempts) = max_attempts {
                let policy = ConflictRetryPolicy {
                    max_attempts: attempts,
                    ..review.conflict_retry.clone()
                };
                review = review.conflict_retry(policy);
            }

            let report = run_load_test(LoadTestConfig {
                stores,
                reviews_per_store,
                concurrency,
                seed,
                review,
            })
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print();
            }

            if !report.is_consistent() {
                bail!("store aggregates diverged from their reviews");
            }
            Ok(())
        }
        Command::Config { config } => {
            let review = load_config(config.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&review)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ReviewConfig> {
    let Some(path) = path else {
        return Ok(ReviewConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    ReviewConfig::from_json_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}
