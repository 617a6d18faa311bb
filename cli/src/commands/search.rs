use anyhow::Result;
use dialoguer::{Confirm, Select};
use getllm_core::{ListFilter, ModelRecord, ModelSource};
use std::io::IsTerminal;

pub async fn execute(
    query: &str,
    source: Option<ModelSource>,
    remote: bool,
    limit: usize,
) -> Result<()> {
    let (_, registry) = super::open()?;
    let mut catalog = registry.load();

    if remote {
        let sources: Vec<ModelSource> = match source {
            Some(source) => vec![source],
            None => ModelSource::ALL.to_vec(),
        };
        for source in sources {
            println!("Searching {} for: {}", source.label(), query);
            match registry.discover(&catalog, source, query, Some(limit)).await {
                Ok(updated) => catalog = updated,
                Err(e) => eprintln!("  {}", e),
            }
        }
        println!();
    }

    let filter = ListFilter {
        source,
        installed_only: false,
        query: Some(query.to_string()),
    };
    let results = registry.list(&catalog, &filter, Some(limit)).await?;

    if results.is_empty() {
        println!("No models found matching '{}'", query);
        if !remote {
            println!("\nRun `getllm search {} --remote` to ask the sources directly.", query);
        }
        return Ok(());
    }

    super::print_records(&results);

    if !std::io::stdin().is_terminal() || !std::io::stdout().is_terminal() {
        println!("\nRun `getllm install <id>` to install a model.");
        return Ok(());
    }

    if let Some(record) = pick(&results)? {
        let confirmed = Confirm::new()
            .with_prompt(format!("Install {}?", record.id))
            .default(true)
            .interact()?;
        if confirmed {
            super::install::execute(Some(&record.id), false).await?;
        }
    }

    Ok(())
}

fn pick(results: &[ModelRecord]) -> Result<Option<&ModelRecord>> {
    let mut items: Vec<String> = results
        .iter()
        .map(|r| match &r.size_label {
            Some(size) => format!("{} ({})", r.id, size),
            None => r.id.clone(),
        })
        .collect();
    items.push("Cancel".to_string());

    println!();
    let choice = Select::new()
        .with_prompt("Select a model to install")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(results.get(choice))
}
