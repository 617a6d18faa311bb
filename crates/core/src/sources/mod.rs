//! Remote source adapters.
//!
//! Each adapter fetches raw listings from one upstream registry. Adapters for
//! the same source are tried in priority order by [`AdapterSet`].

pub mod huggingface;
pub mod ollama;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use tracing::{info, warn};

use crate::error::FetchError;
use crate::models::ModelSource;

pub use huggingface::{HfListing, HuggingFaceApiAdapter};
pub use ollama::{OllamaLibraryAdapter, OllamaListing};

/// A listing in the shape its source produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Ollama(OllamaListing),
    HuggingFace(HfListing),
}

impl RawRecord {
    pub fn source(&self) -> ModelSource {
        match self {
            RawRecord::Ollama(_) => ModelSource::Ollama,
            RawRecord::HuggingFace(_) => ModelSource::HuggingFace,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub query: Option<String>,
    pub limit: Option<usize>,
}

impl FetchRequest {
    pub fn new(query: Option<String>, limit: Option<usize>) -> Self {
        Self {
            query: query.filter(|q| !q.trim().is_empty()),
            limit,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> ModelSource;

    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchError>;
}

/// Prioritized adapters per source. The first adapter that succeeds wins.
#[derive(Default)]
pub struct AdapterSet {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an adapter; earlier adapters have higher priority.
    pub fn with(mut self, adapter: impl SourceAdapter + 'static) -> Self {
        self.adapters.push(Box::new(adapter));
        self
    }

    pub fn push(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn for_source(&self, source: ModelSource) -> impl Iterator<Item = &dyn SourceAdapter> {
        self.adapters
            .iter()
            .filter(move |a| a.source() == source)
            .map(|a| a.as_ref())
    }

    /// Try each adapter for `source` in order. Returns the last error when all fail.
    pub async fn fetch(
        &self,
        source: ModelSource,
        request: &FetchRequest,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let mut last_error = None;

        for adapter in self.for_source(source) {
            match adapter.fetch(request).await {
                Ok(records) => {
                    info!(
                        "Fetched {} {} listings via {}",
                        records.len(),
                        source,
                        adapter.name()
                    );
                    return Ok(records);
                }
                Err(e) => {
                    warn!("Adapter {} failed, trying next: {}", adapter.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(FetchError::NoAdapter(source)))
    }
}

/// Map a transport failure onto the adapter error taxonomy.
pub(crate) fn transport_error(adapter: &str, err: reqwest::Error) -> FetchError {
    if err.is_decode() {
        FetchError::ParseFailed {
            adapter: adapter.to_string(),
            message: err.to_string(),
        }
    } else {
        FetchError::SourceUnreachable {
            adapter: adapter.to_string(),
            message: err.to_string(),
        }
    }
}

/// Turn a non-success HTTP status into a [`FetchError`]; pass successes through.
pub(crate) fn check_status(adapter: &str, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(FetchError::RateLimited {
            adapter: adapter.to_string(),
            retry_after_secs,
        });
    }

    Err(FetchError::SourceUnreachable {
        adapter: adapter.to_string(),
        message: format!("HTTP {}", status),
    })
}
