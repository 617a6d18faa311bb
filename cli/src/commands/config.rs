use anyhow::Result;
use getllm_core::Config;

pub async fn execute(key: Option<&str>, value: Option<&str>) -> Result<()> {
    match (key, value) {
        // Show all config
        (None, None) => {
            let config = Config::load()?;
            println!("Configuration file: {:?}", Config::config_path()?);
            println!("(values include .env and environment overrides)\n");
            println!("[ollama]");
            println!("  host = \"{}\"", config.ollama.host);
            println!("  timeout_secs = {}", config.ollama.timeout_secs);
            println!();
            println!("[sources]");
            println!("  ollama_url = \"{}\"", config.sources.ollama_url);
            println!("  huggingface_url = \"{}\"", config.sources.huggingface_url);
            println!(
                "  hf_token = {}",
                config.sources.hf_token.as_ref().map(|_| "***").unwrap_or("(not set)")
            );
            println!("  hf_search = \"{}\"", config.sources.hf_search);
            println!("  limit = {}", config.sources.limit);
            println!("  timeout_secs = {}", config.sources.timeout_secs);
            println!("  stale_after_hours = {}", config.sources.stale_after_hours);
            println!();
            println!("[models]");
            println!(
                "  default_model = {}",
                config.models.default_model.as_deref().unwrap_or("(not set)")
            );
            println!("  cache_dir = {:?}", config.cache_dir()?);
        }

        // Get a specific key
        (Some(key), None) => {
            let config = Config::load()?;
            let value = get_config_value(&config, key)?;
            println!("{}", value);
        }

        // Set a specific key; overrides from the environment are not saved
        (Some(key), Some(value)) => {
            let mut config = Config::load_file()?;
            set_config_value(&mut config, key, value)?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }

        (None, Some(_)) => unreachable!("clap fills key before value"),
    }

    Ok(())
}

fn get_config_value(config: &Config, key: &str) -> Result<String> {
    match key {
        "ollama.host" => Ok(config.ollama.host.clone()),
        "ollama.timeout_secs" => Ok(config.ollama.timeout_secs.to_string()),
        "sources.ollama_url" => Ok(config.sources.ollama_url.clone()),
        "sources.huggingface_url" => Ok(config.sources.huggingface_url.clone()),
        "sources.hf_token" => Ok(config
            .sources
            .hf_token
            .as_ref()
            .map(|_| "***".to_string())
            .unwrap_or_default()),
        "sources.hf_search" => Ok(config.sources.hf_search.clone()),
        "sources.limit" => Ok(config.sources.limit.to_string()),
        "sources.timeout_secs" => Ok(config.sources.timeout_secs.to_string()),
        "sources.stale_after_hours" => Ok(config.sources.stale_after_hours.to_string()),
        "models.default_model" => Ok(config.models.default_model.clone().unwrap_or_default()),
        "models.cache_dir" => Ok(config.cache_dir()?.display().to_string()),
        _ => anyhow::bail!("Unknown config key: {}", key),
    }
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "ollama.host" => config.ollama.host = value.to_string(),
        "ollama.timeout_secs" => config.ollama.timeout_secs = value.parse()?,
        "sources.ollama_url" => config.sources.ollama_url = value.to_string(),
        "sources.huggingface_url" => config.sources.huggingface_url = value.to_string(),
        "sources.hf_token" => config.sources.hf_token = optional(value),
        "sources.hf_search" => config.sources.hf_search = value.to_string(),
        "sources.limit" => config.sources.limit = value.parse()?,
        "sources.timeout_secs" => config.sources.timeout_secs = value.parse()?,
        "sources.stale_after_hours" => config.sources.stale_after_hours = value.parse()?,
        "models.default_model" => config.models.default_model = optional(value),
        "models.cache_dir" => config.models.cache_dir = optional(value).map(Into::into),
        _ => anyhow::bail!("Unknown config key: {}", key),
    }
    Ok(())
}
