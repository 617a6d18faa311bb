use anyhow::{Context, Result};
use getllm_core::parse_model_ref;

pub async fn execute(model: &str) -> Result<()> {
    let (source, id) = parse_model_ref(model)?;
    let (_, registry) = super::open()?;

    if !registry.is_installed(source, &id).await? {
        println!("{} is not installed.", id);
        return Ok(());
    }

    registry
        .uninstall(&id)
        .await
        .with_context(|| format!("Failed to remove {}", id))?;
    println!("Removed {}", id);

    Ok(())
}
