use anyhow::{Context, Result};

pub async fn execute() -> Result<()> {
    let (_, registry) = super::open()?;
    let catalog = registry.load();

    let models = registry
        .runtime()
        .list_installed()
        .await
        .context("Failed to list installed models")?;

    if models.is_empty() {
        println!("No models installed.");
        println!("\nRun `getllm install <model>` to install a model.");
        return Ok(());
    }

    println!("{:<45} {:<50} {:>10} {}", "NAME", "CATALOG ID", "SIZE", "MODIFIED");
    println!("{}", "-".repeat(120));

    for model in &models {
        let cached = catalog.records().any(|r| r.id == model.id);
        let id = if cached {
            model.id.clone()
        } else {
            format!("{} (not cached)", model.id)
        };
        let size = model.size.map(super::format_size).unwrap_or_else(|| "-".to_string());
        let modified = model
            .modified_at
            .as_deref()
            .and_then(|m| chrono::DateTime::parse_from_rfc3339(m).ok())
            .map(|m| m.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{:<45} {:<50} {:>10} {}",
            super::truncate(&model.name, 45),
            super::truncate(&id, 50),
            size,
            modified
        );
    }

    Ok(())
}
