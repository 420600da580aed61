//! Shared helper functions for CLI commands.

use std::path::Path;

use console::style;

use crate::config::Config;
use crate::models::RecognitionResult;
use crate::recognition::ProviderKind;
use crate::storage::{save_results, JsonlQuestionStore, SessionCredential};

/// Load the config from an explicit path, or discover it.
pub async fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .await
            .map_err(anyhow::Error::msg),
        None => Ok(Config::load().await),
    }
}

/// clap value parser for provider names.
pub fn parse_provider(s: &str) -> Result<ProviderKind, String> {
    ProviderKind::from_str(s).ok_or_else(|| {
        format!(
            "unknown provider '{}' (expected one of: {})",
            s,
            ProviderKind::ALL.map(|k| k.as_str()).join(", ")
        )
    })
}

/// Shorten to `max` characters, appending an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Print recognized questions in a compact listing.
pub fn print_results(results: &[RecognitionResult]) {
    for (i, result) in results.iter().enumerate() {
        let first_line = result.content.lines().next().unwrap_or_default();
        println!(
            "  {} {} {}",
            style(format!("{}.", i + 1)).bold(),
            truncate(first_line, 72),
            style(format!(
                "[{} / {} / {}, {:.0}%]",
                result.subject.display_name(),
                result.category,
                result.difficulty,
                result.confidence * 100.0
            ))
            .dim()
        );
        if !result.answer.is_empty() {
            println!("     {} {}", style("答案:").dim(), truncate(&result.answer, 72));
        }
    }
}

/// Append results to a JSON Lines question file.
pub async fn save_to_file(
    store: &JsonlQuestionStore,
    results: &[RecognitionResult],
) -> anyhow::Result<usize> {
    let stored = save_results(store, &SessionCredential::local(), results).await?;
    Ok(stored.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("已知函数f(x)=x²", 6), "已知函...");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_parse_provider_lists_choices() {
        assert_eq!(parse_provider("Alibaba"), Ok(ProviderKind::DashScope));
        let err = parse_provider("openai").unwrap_err();
        assert!(err.contains("alibaba, baidu, gemini"));
    }
}
