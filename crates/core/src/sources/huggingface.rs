use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{check_status, transport_error, FetchRequest, RawRecord, SourceAdapter};
use crate::error::FetchError;
use crate::models::ModelSource;

pub const HF_BASE_URL: &str = "https://huggingface.co";

/// Default number of listings requested when the caller gives no limit.
const DEFAULT_LIMIT: usize = 50;

/// One entry of `GET /api/models`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HfListing {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "modelId")]
    pub model_id: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub downloads: Option<u64>,
    #[serde(default)]
    pub likes: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pipeline_tag: Option<String>,
    #[serde(default)]
    pub library_name: Option<String>,
    #[serde(default, rename = "lastModified")]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub gated: Option<serde_json::Value>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default, rename = "cardData")]
    pub card_data: Option<HfCardData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HfCardData {
    #[serde(default)]
    pub description: Option<String>,
}

/// Lists models through the Hugging Face hub search API.
pub struct HuggingFaceApiAdapter {
    client: Client,
    base_url: String,
    token: Option<String>,
    default_search: String,
}

impl HuggingFaceApiAdapter {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        default_search: &str,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("getllm/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            default_search: default_search.to_string(),
        })
    }

    fn search_term<'a>(&'a self, request: &'a FetchRequest) -> &'a str {
        request.query.as_deref().unwrap_or(&self.default_search)
    }
}

#[async_trait]
impl SourceAdapter for HuggingFaceApiAdapter {
    fn source(&self) -> ModelSource {
        ModelSource::HuggingFace
    }

    fn name(&self) -> &str {
        "huggingface-api"
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchError> {
        let url = format!("{}/api/models", self.base_url);
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT).to_string();
        let search = self.search_term(request);
        debug!("Searching Hugging Face for '{}' (limit {})", search, limit);

        let mut builder = self.client.get(&url).query(&[
            ("search", search),
            ("sort", "downloads"),
            ("direction", "-1"),
            ("limit", limit.as_str()),
        ]);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        let response = check_status(self.name(), response)?;

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(self.name(), e))?;
        let listings: Vec<HfListing> =
            serde_json::from_str(&body).map_err(|e| FetchError::ParseFailed {
                adapter: self.name().to_string(),
                message: e.to_string(),
            })?;

        Ok(listings.into_iter().map(RawRecord::HuggingFace).collect())
    }
}
