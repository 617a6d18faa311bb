use anyhow::Result;
use getllm_core::{CacheStatus, Freshness, ModelSource};

pub async fn execute() -> Result<()> {
    let (config, registry) = super::open()?;

    println!("getllm status\n");

    match registry.runtime().version().await {
        Ok(version) => println!("Ollama: running at {} (version {})", config.ollama.host, version),
        Err(e) => println!("Ollama: not reachable ({})", e),
    }

    let loaded = registry.load_with_status();
    println!("Cache: {:?}", registry.store().dir());
    match &loaded.status {
        CacheStatus::Loaded => {}
        CacheStatus::Missing => println!("  (not created yet)"),
        CacheStatus::Corrupt(reason) => println!("  (unreadable, treated as empty: {})", reason),
    }

    println!();
    for source in ModelSource::ALL {
        let count = loaded.catalog.count_for(source);
        let state = match registry.freshness(&loaded.catalog, source) {
            Freshness::Empty => "never fetched".to_string(),
            Freshness::Fresh(at) => format!("fetched {}", at.format("%Y-%m-%d %H:%M UTC")),
            Freshness::Stale(at) => {
                format!("stale, fetched {}", at.format("%Y-%m-%d %H:%M UTC"))
            }
        };
        println!("{:<14} {:>6} models  {}", source.label(), count, state);
    }

    println!(
        "\nDefault model: {}",
        config.models.default_model.as_deref().unwrap_or("(not set)")
    );

    let stale = registry.stale_sources(&loaded.catalog);
    if !stale.is_empty() {
        println!("\nRun `getllm update --if-stale` to refresh old listings.");
    }

    Ok(())
}
