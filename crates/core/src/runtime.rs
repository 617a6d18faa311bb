//! Local model runtime.
//!
//! Installed state is never cached; every question goes to the runtime.
//! [`OllamaRuntime`] speaks the Ollama HTTP API.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{CatalogError, Result, RuntimeError};
use crate::models::ModelSource;

pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

const HF_PREFIX: &str = "hf.co/";
const LATEST: &str = ":latest";

/// One line of a pull progress stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
}

/// A model present in the runtime, with the catalog id it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModel {
    pub name: String,
    pub id: String,
    pub size: Option<u64>,
    pub modified_at: Option<String>,
}

pub type ProgressFn<'a> = &'a (dyn Fn(&PullProgress) + Send + Sync);

#[async_trait]
pub trait Runtime: Send + Sync {
    async fn list_installed(&self) -> Result<Vec<InstalledModel>>;

    async fn install(&self, id: &str, progress: ProgressFn<'_>) -> Result<()>;

    async fn uninstall(&self, id: &str) -> Result<()>;

    async fn version(&self) -> Result<String>;

    async fn is_installed(&self, id: &str) -> Result<bool> {
        let tag = runtime_tag(id)?;
        Ok(self
            .list_installed()
            .await?
            .iter()
            .any(|m| m.name.eq_ignore_ascii_case(&tag)))
    }
}

/// Runtime model name for a catalog id.
///
/// `ollama/llama3` becomes `llama3:latest`, `ollama/llama3:8b` stays
/// `llama3:8b`, and `huggingface/org/repo` becomes `hf.co/org/repo:latest`.
pub fn runtime_tag(id: &str) -> Result<String> {
    let with_tag = |name: &str| {
        if name.rsplit('/').next().unwrap_or(name).contains(':') {
            name.to_string()
        } else {
            format!("{}{}", name, LATEST)
        }
    };

    if let Some(name) = ModelSource::Ollama.local_name(id) {
        return Ok(with_tag(name));
    }
    if let Some(repo) = ModelSource::HuggingFace.local_name(id) {
        return Ok(with_tag(&format!("{}{}", HF_PREFIX, repo)));
    }
    Err(CatalogError::InvalidId(format!(
        "'{}' is not a namespaced catalog id",
        id
    )))
}

/// Catalog id for a runtime model name; the inverse of [`runtime_tag`].
pub fn model_id_from_runtime(name: &str) -> String {
    let bare = name.strip_suffix(LATEST).unwrap_or(name);
    match bare.strip_prefix(HF_PREFIX) {
        Some(repo) => ModelSource::HuggingFace.qualify(repo),
        None => ModelSource::Ollama.qualify(bare),
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct PullLine {
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    progress: PullProgress,
}

pub struct OllamaRuntime {
    client: Client,
    host: String,
    timeout: Duration,
}

impl OllamaRuntime {
    /// `timeout` bounds every call except the pull stream, which may run for
    /// as long as the download takes.
    pub fn new(host: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("getllm/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| RuntimeError::Unreachable {
            url: self.host.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RuntimeError::Api {
            operation: operation.to_string(),
            status: status.as_u16(),
            message: api_message(&body),
        }
        .into())
    }
}

/// Ollama reports failures as `{"error": "..."}`; fall back to the raw body.
fn api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn stream_error(operation: &str, message: impl Into<String>) -> CatalogError {
    RuntimeError::Stream {
        operation: operation.to_string(),
        message: message.into(),
    }
    .into()
}

/// Handle one NDJSON line; returns whether it reported completion.
fn handle_pull_line(operation: &str, line: &[u8], progress: ProgressFn<'_>) -> Result<bool> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(false);
    }

    let parsed: PullLine = serde_json::from_str(line)
        .map_err(|e| stream_error(operation, format!("bad progress line: {}", e)))?;
    if let Some(error) = parsed.error {
        return Err(stream_error(operation, error));
    }

    progress(&parsed.progress);
    Ok(parsed.progress.status == "success")
}

#[async_trait]
impl Runtime for OllamaRuntime {
    async fn list_installed(&self) -> Result<Vec<InstalledModel>> {
        let operation = "list models";
        let response = self
            .send(
                operation,
                self.client.get(self.url("/api/tags")).timeout(self.timeout),
            )
            .await?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| stream_error(operation, e.to_string()))?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| InstalledModel {
                id: model_id_from_runtime(&m.name),
                name: m.name,
                size: m.size,
                modified_at: m.modified_at,
            })
            .collect())
    }

    async fn install(&self, id: &str, progress: ProgressFn<'_>) -> Result<()> {
        let tag = runtime_tag(id)?;
        let operation = format!("pull {}", tag);
        debug!("Pulling {} via {}", tag, self.host);

        let response = self
            .send(
                &operation,
                self.client
                    .post(self.url("/api/pull"))
                    .json(&serde_json::json!({ "model": tag, "stream": true })),
            )
            .await?;

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| stream_error(&operation, e.to_string()))?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                finished |= handle_pull_line(&operation, &line, progress)?;
            }
        }
        finished |= handle_pull_line(&operation, &buffer, progress)?;

        if !finished {
            return Err(stream_error(&operation, "stream ended before the pull completed"));
        }
        Ok(())
    }

    async fn uninstall(&self, id: &str) -> Result<()> {
        let tag = runtime_tag(id)?;
        let operation = format!("delete {}", tag);
        self.send(
            &operation,
            self.client
                .delete(self.url("/api/delete"))
                .timeout(self.timeout)
                .json(&serde_json::json!({ "model": tag })),
        )
        .await?;
        debug!("Deleted {}", tag);
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        let operation = "version";
        let response = self
            .send(
                operation,
                self.client.get(self.url("/api/version")).timeout(self.timeout),
            )
            .await?;
        let version: VersionResponse = response
            .json()
            .await
            .map_err(|e| stream_error(operation, e.to_string()))?;
        Ok(version.version)
    }
}
