use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::runtime::DEFAULT_OLLAMA_HOST;
use crate::sources::huggingface::HF_BASE_URL;
use crate::sources::ollama::OLLAMA_LIBRARY_URL;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Local Ollama server
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Remote catalogs
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Model selection and cache location
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama API
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Seconds before a non-streaming API call gives up
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_huggingface_url")]
    pub huggingface_url: String,

    /// HuggingFace token for rate limits and gated listings
    #[serde(default)]
    pub hf_token: Option<String>,

    /// Search term used when refreshing Hugging Face without a query
    #[serde(default = "default_hf_search")]
    pub hf_search: String,

    /// Listings requested per refresh
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Age after which a source's cached listings are reported as stale
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub default_model: Option<String>,

    /// Directory holding the catalog cache (default: ~/.config/getllm/cache/)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_ollama_host() -> String {
    DEFAULT_OLLAMA_HOST.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ollama_url() -> String {
    OLLAMA_LIBRARY_URL.to_string()
}

fn default_huggingface_url() -> String {
    HF_BASE_URL.to_string()
}

fn default_hf_search() -> String {
    "GGUF".to_string()
}

fn default_limit() -> usize {
    50
}

fn default_stale_after_hours() -> u64 {
    24
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            huggingface_url: default_huggingface_url(),
            hf_token: None,
            hf_search: default_hf_search(),
            limit: default_limit(),
            timeout_secs: default_timeout_secs(),
            stale_after_hours: default_stale_after_hours(),
        }
    }
}

impl OllamaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `stale_after_hours` as a span; values too large to represent mean
    /// "never stale".
    pub fn stale_after(&self) -> chrono::Duration {
        i64::try_from(self.stale_after_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Config {
    /// Get the base directory: ~/.config/getllm/
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("getllm"))
    }

    /// Load the config file, then apply `.env` and environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        dotenv::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load the config file only. Use this when the result will be saved, so
    /// environment overrides are never written back.
    pub fn load_file() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {:?}", config_path))?;
            Self::from_toml(&content).with_context(|| format!("Invalid config {:?}", config_path))
        } else {
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save config to default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    /// Apply `OLLAMA_HOST`, `OLLAMA_TIMEOUT`, `HF_TOKEN`, `GETLLM_CACHE_DIR`
    /// and `GETLLM_DEFAULT_MODEL`. Unparseable or empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("OLLAMA_HOST") {
            self.ollama.host = normalize_host(&host);
        }
        if let Some(secs) = var("OLLAMA_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.ollama.timeout_secs = secs;
        }
        if let Some(token) = var("HF_TOKEN") {
            self.sources.hf_token = Some(token);
        }
        if let Some(dir) = var("GETLLM_CACHE_DIR") {
            self.models.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(model) = var("GETLLM_DEFAULT_MODEL") {
            self.models.default_model = Some(model);
        }
    }

    /// Get the config file path: ~/.config/getllm/config.toml
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.toml"))
    }

    /// Get the cache directory from config, or ~/.config/getllm/cache/
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.models.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::base_dir()?.join("cache")),
        }
    }
}

/// `OLLAMA_HOST` is often given as `host:port` without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}
