//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod batch;
mod providers;
mod recognize;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::helpers::{load_config, parse_provider};
use crate::recognition::ProviderKind;

#[derive(Parser)]
#[command(name = "mistakebook")]
#[command(about = "Recognize exam questions from photos for a mistake notebook")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "MISTAKEBOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize the questions in one image
    Recognize {
        /// Image file (JPEG, PNG, GIF or WebP)
        image: PathBuf,
        /// Preferred provider: alibaba, gemini or baidu
        #[arg(short, long, value_parser = parse_provider)]
        provider: Option<ProviderKind>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Append recognized questions to a JSON Lines file
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },

    /// Recognize many images with bounded concurrency and retries
    Batch {
        /// Image files
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Preferred provider: alibaba, gemini or baidu
        #[arg(short, long, value_parser = parse_provider)]
        provider: Option<ProviderKind>,
        /// Images recognized at the same time
        #[arg(long)]
        concurrency: Option<usize>,
        /// Automatic retries per image
        #[arg(long)]
        max_retries: Option<u32>,
        /// Manually retry every failed image once the batch finishes
        #[arg(long)]
        retry_failed: bool,
        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
        /// Append recognized questions to a JSON Lines file
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },

    /// Show provider configuration and the fallback order
    Providers,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Recognize {
            image,
            provider,
            json,
            save,
        } => recognize::cmd_recognize(&config, &image, provider, json, save.as_deref()).await,
        Commands::Batch {
            images,
            provider,
            concurrency,
            max_retries,
            retry_failed,
            json,
            save,
        } => {
            let mut options = config.batch.options();
            if let Some(n) = concurrency {
                options.concurrency = n.max(1);
            }
            if let Some(n) = max_retries {
                options.max_retries = n;
            }
            batch::cmd_batch(
                &config,
                &images,
                provider,
                options,
                retry_failed,
                json,
                save.as_deref(),
            )
            .await
        }
        Commands::Providers => providers::cmd_providers(&config),
    }
}
