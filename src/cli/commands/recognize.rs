//! Single-image recognition command.

use std::path::Path;

use anyhow::Context;
use console::style;

use crate::cli::helpers::{print_results, save_to_file};
use crate::config::Config;
use crate::recognition::{ImageInput, ProviderKind, Recognizer};
use crate::storage::JsonlQuestionStore;

/// Recognize one image and print or save the questions found.
pub async fn cmd_recognize(
    config: &Config,
    image: &Path,
    provider: Option<ProviderKind>,
    json: bool,
    save: Option<&Path>,
) -> anyhow::Result<()> {
    let recognizer = Recognizer::from_config(config).context("Failed to build HTTP client")?;
    let preferred = provider.unwrap_or(config.recognition.default_provider);

    let input = ImageInput::from_path(image)
        .await
        .with_context(|| format!("Failed to read {}", image.display()))?;

    if !json {
        println!(
            "{} Recognizing {} with {}",
            style("→").cyan(),
            input.name(),
            preferred.display_name()
        );
    }

    let results = match recognizer.recognize_image(&input, preferred).await {
        Ok(results) => results,
        Err(e) => {
            tracing::debug!("Recognition of {} failed: {:?}", input.name(), e);
            anyhow::bail!(e.user_message());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!(
            "{} Found {} question(s)",
            style("✓").green(),
            results.len()
        );
        print_results(&results);
    }

    if let Some(path) = save {
        let store = JsonlQuestionStore::new(path);
        let saved = save_to_file(&store, &results).await?;
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
