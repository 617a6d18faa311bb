//! Show model information

use anyhow::Result;
use getllm_core::{parse_model_ref, CatalogError};

pub async fn execute(model: &str) -> Result<()> {
    let (source, id) = parse_model_ref(model)?;
    let (_, registry) = super::open()?;
    let catalog = registry.load();

    let info = match registry.get(&catalog, source, &id) {
        Ok(info) => info,
        Err(CatalogError::NotFound { .. }) => {
            eprintln!("Model '{}' not found in the cached catalog", id);
            eprintln!();
            eprintln!("Use `getllm search {} --remote` to look it up upstream", model);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    println!("Model: {}", info.id);
    println!("Name: {}", info.display_name);
    println!("Source: {}", info.source.label());
    println!("Size: {}", info.size_label.as_deref().unwrap_or("unknown"));
    if !info.tags.is_empty() {
        let tags: Vec<&str> = info.tags.iter().map(String::as_str).collect();
        println!("Tags: {}", tags.join(", "));
    }
    if let Some(description) = &info.description {
        println!("Description: {}", description);
    }
    for (key, value) in &info.metadata {
        let value = match key.as_str() {
            "downloads" | "likes" => value
                .parse::<u64>()
                .map(super::format_number)
                .unwrap_or_else(|_| value.clone()),
            _ => value.clone(),
        };
        println!("  {}: {}", key, value);
    }
    println!("Fetched: {}", info.fetched_at.format("%Y-%m-%d %H:%M UTC"));

    match registry.is_installed(source, &id).await {
        Ok(true) => println!("Installed: yes"),
        Ok(false) => println!("Installed: no"),
        Err(e) => println!("Installed: unknown ({})", e),
    }

    Ok(())
}
