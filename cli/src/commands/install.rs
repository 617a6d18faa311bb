use anyhow::{Context, Result};
use getllm_core::{parse_model_ref, PullProgress};
use indicatif::{ProgressBar, ProgressStyle};

pub async fn execute(model: Option<&str>, force: bool) -> Result<()> {
    let (config, registry) = super::open()?;

    let model = match model {
        Some(model) => model.to_string(),
        None => config.models.default_model.clone().context(
            "No model given and no default model set; use `getllm default <model>`",
        )?,
    };
    let (source, id) = parse_model_ref(&model)?;

    let catalog = registry.load();
    if registry.get(&catalog, source, &id).is_err() {
        eprintln!(
            "Note: {} is not in the cached catalog, asking Ollama for it anyway.",
            id
        );
    }

    if !force && registry.is_installed(source, &id).await? {
        println!("{} is already installed. Use --force to pull it again.", id);
        return Ok(());
    }

    println!("Installing model: {}", id);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?
            .progress_chars("#>-"),
    );

    let on_progress = |p: &PullProgress| {
        if let Some(total) = p.total {
            pb.set_length(total);
        }
        if let Some(completed) = p.completed {
            pb.set_position(completed);
        }
        pb.set_message(p.status.clone());
    };

    match registry.install(&id, &on_progress).await {
        Ok(()) => {
            pb.finish_with_message("done");
            println!("\nModel installed successfully: {}", id);
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            Err(e).with_context(|| format!("Failed to install {}", id))
        }
    }
}
