//! `parley providers`: show the configured provider chain.

use parley_config::AppConfig;
use parley_providers::{ChainEntryInfo, EntryStatus, describe_chain};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let chain = describe_chain(&config);

    println!("Provider chain (tried in order)");
    println!("===============================");
    println!();
    for line in render(&chain) {
        println!("{line}");
    }

    let active = chain
        .iter()
        .filter(|e| e.status == EntryStatus::Active)
        .count();
    println!();
    if active == 0 {
        println!("  No active providers: every reply will be a local fallback.");
        println!("  Set an API key (e.g. OPENAI_API_KEY) or add api_key to a [[providers]] entry.");
    } else {
        println!("  {active} of {} providers active", chain.len());
    }

    Ok(())
}

fn status_label(status: EntryStatus) -> &'static str {
    match status {
        EntryStatus::Active => "active",
        EntryStatus::Disabled => "disabled",
        EntryStatus::MissingKey => "no api key",
    }
}

fn render(chain: &[ChainEntryInfo]) -> Vec<String> {
    let mut lines = vec![format!(
        "  {:<3} {:<10} {:<28} {:>8} {:>5}  {}",
        "#", "Provider", "Model", "Timeout", "Conf", "Status"
    )];
    for (i, entry) in chain.iter().enumerate() {
        lines.push(format!(
            "  {:<3} {:<10} {:<28} {:>7}s {:>5}  {}",
            i + 1,
            entry.name,
            entry.model,
            entry.timeout_secs,
            entry.confidence,
            status_label(entry.status)
        ));
    }
    lines
}
