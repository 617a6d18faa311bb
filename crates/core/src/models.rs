use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// Upstream registry a model listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    Ollama,
    HuggingFace,
}

impl ModelSource {
    pub const ALL: [ModelSource; 2] = [ModelSource::Ollama, ModelSource::HuggingFace];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSource::Ollama => "ollama",
            ModelSource::HuggingFace => "huggingface",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelSource::Ollama => "Ollama",
            ModelSource::HuggingFace => "Hugging Face",
        }
    }

    /// Namespaced id for a name local to this source, e.g. `ollama/llama3:8b`.
    pub fn qualify(&self, local_name: &str) -> String {
        format!("{}/{}", self.as_str(), local_name)
    }

    /// Strip this source's namespace from `id`, if it carries it.
    pub fn local_name<'a>(&self, id: &'a str) -> Option<&'a str> {
        id.strip_prefix(self.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSource {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ModelSource::Ollama),
            "huggingface" | "hf" | "hugging-face" => Ok(ModelSource::HuggingFace),
            other => Err(CatalogError::InvalidId(format!("unknown source '{}'", other))),
        }
    }
}

/// Canonical, source-independent description of one installable model variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub display_name: String,
    pub source: ModelSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_label: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub fetched_at: DateTime<Utc>,
}

impl ModelRecord {
    /// The id without its source namespace (`llama3:8b` for `ollama/llama3:8b`).
    pub fn local_name(&self) -> &str {
        self.source.local_name(&self.id).unwrap_or(&self.id)
    }

    /// Case-insensitive substring match over id, display name, description and tags.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return true;
        }

        self.id.to_lowercase().contains(&needle)
            || self.display_name.to_lowercase().contains(&needle)
            || self
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

/// Split a user-supplied model reference into its source and namespaced id.
///
/// `ollama/...` and `huggingface/...` (or `hf/...`) are explicit. A bare name
/// with a `/` is a Hugging Face repo; anything else is an Ollama model.
pub fn parse_model_ref(input: &str) -> Result<(ModelSource, String), CatalogError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CatalogError::InvalidId("model id is empty".to_string()));
    }

    if let Some((prefix, rest)) = input.split_once('/') {
        if let Ok(source) = prefix.parse::<ModelSource>() {
            if rest.is_empty() {
                return Err(CatalogError::InvalidId(format!(
                    "'{}' has no model name after the source",
                    input
                )));
            }
            return Ok((source, source.qualify(rest)));
        }
        return Ok((ModelSource::HuggingFace, ModelSource::HuggingFace.qualify(input)));
    }

    Ok((ModelSource::Ollama, ModelSource::Ollama.qualify(input)))
}
