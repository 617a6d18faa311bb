use anyhow::Result;
use getllm_core::{CacheStatus, ModelSource};

pub async fn execute(source: Option<ModelSource>, if_stale: bool) -> Result<()> {
    let (_, registry) = super::open()?;

    let loaded = registry.load_with_status();
    if let CacheStatus::Corrupt(reason) = &loaded.status {
        eprintln!("Warning: rebuilding unreadable model cache ({})", reason);
    }
    let mut catalog = loaded.catalog;

    let mut targets: Vec<ModelSource> = match source {
        Some(source) => vec![source],
        None => ModelSource::ALL.to_vec(),
    };
    if if_stale {
        targets.retain(|s| registry.freshness(&catalog, *s).needs_refresh());
        if targets.is_empty() {
            println!("All sources are up to date.");
            return Ok(());
        }
    }

    let mut failed = 0;
    for source in &targets {
        println!("Updating {} listings...", source.label());
        match registry.refresh(&catalog, *source).await {
            Ok(updated) => {
                println!("  {} models cached", updated.count_for(*source));
                catalog = updated;
            }
            Err(e) => {
                eprintln!("  {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} source refreshes failed", failed, targets.len());
    }

    println!("\nCatalog saved in {:?}", registry.store().dir());
    Ok(())
}
