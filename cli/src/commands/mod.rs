pub mod config;
pub mod default;
pub mod info;
pub mod install;
pub mod installed;
pub mod list;
pub mod search;
pub mod status;
pub mod uninstall;
pub mod update;

use anyhow::Result;
use getllm_core::{Catalog, Config, Freshness, ModelRecord, ModelRegistry, ModelSource};

/// clap value parser for `--source`.
pub fn parse_source(s: &str) -> std::result::Result<ModelSource, String> {
    s.parse::<ModelSource>().map_err(|e| e.to_string())
}

/// Load the effective config and build the registry from it.
pub fn open() -> Result<(Config, ModelRegistry)> {
    let config = Config::load()?;
    let registry = ModelRegistry::from_config(&config)?;
    Ok((config, registry))
}

pub fn print_records(records: &[ModelRecord]) {
    println!("{:<50} {:>8} {:<12} {}", "ID", "SIZE", "SOURCE", "DESCRIPTION");
    println!("{}", "-".repeat(110));

    for record in records {
        println!(
            "{:<50} {:>8} {:<12} {}",
            truncate(&record.id, 50),
            record.size_label.as_deref().unwrap_or("-"),
            record.source.label(),
            truncate(record.description.as_deref().unwrap_or(""), 40)
        );
    }
}

/// Hint at `getllm update` for sources whose listings are old or missing.
pub fn print_stale_hints(registry: &ModelRegistry, catalog: &Catalog, only: Option<ModelSource>) {
    for source in ModelSource::ALL {
        if only.is_some_and(|s| s != source) {
            continue;
        }
        match registry.freshness(catalog, source) {
            Freshness::Stale(at) => eprintln!(
                "Note: {} listings were fetched {}; run `getllm update --source {}` to refresh.",
                source.label(),
                at.format("%Y-%m-%d %H:%M UTC"),
                source
            ),
            Freshness::Empty | Freshness::Fresh(_) => {}
        }
    }
}

pub fn format_number(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Cut `s` to at most `width` characters, marking the cut with `...`.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
