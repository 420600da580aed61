//! Batch recognition command.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::cli::helpers::{print_results, save_to_file, truncate};
use crate::config::Config;
use crate::models::{ImageQueueItem, QueueStatus};
use crate::recognition::{ImageInput, ProviderKind, Recognizer};
use crate::services::{BatchEvent, BatchOptions, BatchQueue};
use crate::storage::JsonlQuestionStore;

/// Recognize many images through the batch queue.
pub async fn cmd_batch(
    config: &Config,
    paths: &[PathBuf],
    provider: Option<ProviderKind>,
    options: BatchOptions,
    retry_failed: bool,
    json: bool,
    save: Option<&Path>,
) -> anyhow::Result<()> {
    let recognizer = Recognizer::from_config(config).context("Failed to build HTTP client")?;
    let preferred = provider.unwrap_or(config.recognition.default_provider);

    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        match ImageInput::from_path(path).await {
            Ok(image) => images.push(image),
            Err(e) => eprintln!(
                "{} Skipping {}: {}",
                style("!").yellow(),
                path.display(),
                e
            ),
        }
    }
    if images.is_empty() {
        anyhow::bail!("No readable images given");
    }

    if !json {
        println!(
            "{} Recognizing {} images with {} (concurrency {}, retries {})",
            style("→").cyan(),
            images.len(),
            preferred.display_name(),
            options.concurrency,
            options.max_retries
        );
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel::<BatchEvent>();
    let progress = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(images.len() as u64)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
            .unwrap()
            .progress_chars("█▓░"),
    );
    progress.set_message("Recognizing...");

    // Spawn event handler for UI
    let event_handler = tokio::spawn(render_events(event_rx, progress));

    let queue = BatchQueue::new(recognizer, preferred, options).with_events(event_tx);
    let mut report = queue.run_batch(images).await;

    if retry_failed {
        for item in report
            .items
            .iter_mut()
            .filter(|i| i.status == QueueStatus::Failed)
        {
            queue.retry_image(item).await;
        }
    }

    // Closing the channel lets the handler finish
    drop(queue);
    let _ = event_handler.await;

    let succeeded = report
        .items
        .iter()
        .filter(|i| i.status == QueueStatus::Success)
        .count();
    let failed = report.total() - succeeded;

    if json {
        let items: Vec<_> = report.items.iter().map(item_json).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in &report.items {
            print_item(item);
        }
        println!();
        println!(
            "{} {} succeeded, {} failed",
            if failed == 0 {
                style("✓").green()
            } else {
                style("!").yellow()
            },
            succeeded,
            failed
        );
    }

    if let Some(path) = save {
        let store = JsonlQuestionStore::new(path);
        let mut saved = 0;
        for item in &report.items {
            if let Some(ref results) = item.result {
                saved += save_to_file(&store, results).await?;
            }
        }
        if !json {
            println!(
                "{} Saved {} question(s) to {}",
                style("✓").green(),
                saved,
                path.display()
            );
        }
    }

    Ok(())
}

async fn render_events(mut event_rx: mpsc::UnboundedReceiver<BatchEvent>, progress: ProgressBar) {
    let mut names: HashMap<String, String> = HashMap::new();
    let mut finished: HashSet<String> = HashSet::new();

    while let Some(event) = event_rx.recv().await {
        match event {
            BatchEvent::ItemStarted { id, name, attempt } => {
                if attempt > 1 {
                    progress.set_message(format!("{} (attempt {})", truncate(&name, 40), attempt));
                } else {
                    progress.set_message(truncate(&name, 40));
                }
                names.insert(id, name);
            }
            BatchEvent::ItemProgress { .. } => {}
            BatchEvent::ItemRetrying {
                id,
                retry_count,
                error,
            } => {
                let name = names.get(&id).map(String::as_str).unwrap_or(&id);
                progress.println(format!(
                    "{} {} retry {}: {}",
                    style("↻").yellow(),
                    name,
                    retry_count,
                    error
                ));
            }
            BatchEvent::ItemSucceeded { id, .. } => {
                // A manual retry finishes an item a second time
                if !finished.insert(id) {
                    progress.inc_length(1);
                }
                progress.inc(1);
            }
            BatchEvent::ItemFailed { id, error } => {
                let name = names.get(&id).cloned().unwrap_or_else(|| id.clone());
                progress.println(format!("{} {}: {}", style("✗").red(), name, error));
                if !finished.insert(id) {
                    progress.inc_length(1);
                }
                progress.inc(1);
            }
            BatchEvent::Completed { .. } => {
                progress.set_message("Done");
            }
        }
    }

    progress.finish_and_clear();
}

fn print_item(item: &ImageQueueItem) {
    match item.status {
        QueueStatus::Success => {
            let results = item.result.as_deref().unwrap_or_default();
            println!(
                "{} {} ({} question(s))",
                style("✓").green(),
                item.name(),
                results.len()
            );
            print_results(results);
        }
        _ => println!(
            "{} {}: {}",
            style("✗").red(),
            item.name(),
            item.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn item_json(item: &ImageQueueItem) -> serde_json::Value {
    serde_json::json!({
        "id": item.id,
        "name": item.name(),
        "status": item.status.as_str(),
        "retryCount": item.retry_count,
        "result": item.result,
        "error": item.error,
    })
}
