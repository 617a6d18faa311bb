use anyhow::{Context, Result};
use getllm_core::{CacheStatus, ListFilter, ModelSource};

pub async fn execute(
    source: Option<ModelSource>,
    installed: bool,
    limit: Option<usize>,
    query: Option<&str>,
) -> Result<()> {
    let (_, registry) = super::open()?;

    let loaded = registry.load_with_status();
    if let CacheStatus::Corrupt(reason) = &loaded.status {
        eprintln!("Warning: the model cache could not be read and was ignored ({})", reason);
    }
    let catalog = loaded.catalog;

    let filter = ListFilter {
        source,
        installed_only: installed,
        query: query.map(str::to_string),
    };
    let records = registry
        .list(&catalog, &filter, limit)
        .await
        .context("Failed to check installed models")?;

    super::print_stale_hints(&registry, &catalog, source);

    if records.is_empty() {
        if catalog.is_empty() {
            println!("The model catalog is empty.");
            println!("\nRun `getllm update` to fetch model listings.");
        } else {
            println!("No models match the given filters.");
        }
        return Ok(());
    }

    super::print_records(&records);
    println!("\n{} model(s)", records.len());

    Ok(())
}
