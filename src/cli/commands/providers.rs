//! Provider status command.

use console::style;

use crate::config::Config;
use crate::recognition::Recognizer;

/// Show which providers are configured and how fallback proceeds.
pub fn cmd_providers(config: &Config) -> anyhow::Result<()> {
    let recognizer = Recognizer::from_config(config)?;
    let default = config.recognition.default_provider;

    println!("{}", style("Recognition providers").bold());
    for provider in recognizer.providers().iter() {
        let kind = provider.kind();
        let marker = if provider.is_configured() {
            style("✓").green()
        } else {
            style("✗").red()
        };
        let default_tag = if kind == default { " (default)" } else { "" };
        println!(
            "  {} {:<18} {}{}",
            marker,
            kind.display_name(),
            style(kind.as_str()).dim(),
            default_tag
        );
        println!("      {}", style(provider.availability_hint()).dim());
    }

    println!();
    println!("{}", style("Fallback order").bold());
    for kind in crate::recognition::ProviderKind::ALL {
        let chain = kind.fallback_chain();
        let rest = if chain.is_empty() {
            style("no fallback").dim().to_string()
        } else {
            chain
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(" → ")
        };
        println!("  {} {} {}", kind.as_str(), style("→").dim(), rest);
    }

    if let Some(ref path) = config.source_path {
        println!();
        println!("{} Config: {}", style("→").dim(), path.display());
    }

    Ok(())
}
