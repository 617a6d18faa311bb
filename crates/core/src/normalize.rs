//! Maps source-specific listings onto [`ModelRecord`].

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::warn;

use crate::models::{ModelRecord, ModelSource};
use crate::sources::huggingface::HfListing;
use crate::sources::ollama::OllamaListing;
use crate::sources::RawRecord;

fn size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^a-z0-9.])((?:\d+x)?\d+(?:\.\d+)?)([bm])(?:[^a-z0-9]|$)")
            .expect("size pattern is valid")
    })
}

/// Find a parameter-count label such as `7B` or `1.5B` in free text.
pub fn find_size_label(text: &str) -> Option<String> {
    let caps = size_pattern().captures(text)?;
    let number = caps.get(1)?.as_str().to_lowercase();
    let unit = caps.get(2)?.as_str().to_uppercase();
    Some(format!("{}{}", number, unit))
}

/// Explicit size field first, then display name, description and tags.
fn extract_size(
    explicit: Option<&str>,
    display_name: &str,
    description: Option<&str>,
    tags: &BTreeSet<String>,
) -> Option<String> {
    explicit
        .and_then(find_size_label)
        .or_else(|| find_size_label(display_name))
        .or_else(|| description.and_then(find_size_label))
        .or_else(|| tags.iter().find_map(|t| find_size_label(t)))
}

fn usable_name(name: &str) -> Option<&str> {
    let name = name.trim();
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        None
    } else {
        Some(name)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn clean_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize one raw listing. Returns `None` (and logs) when the listing has
/// no usable identifier or does not belong to `source`.
pub fn normalize(
    source: ModelSource,
    raw: &RawRecord,
    fetched_at: DateTime<Utc>,
) -> Option<ModelRecord> {
    if raw.source() != source {
        warn!(
            "Skipping {} listing handed to the {} normalizer",
            raw.source(),
            source
        );
        return None;
    }

    let record = match raw {
        RawRecord::Ollama(listing) => normalize_ollama(listing, fetched_at),
        RawRecord::HuggingFace(listing) => normalize_huggingface(listing, fetched_at),
    };

    if record.is_none() {
        warn!("Skipping {} listing without a usable name: {:?}", source, raw);
    }
    record
}

/// Normalize a batch, skipping rejected listings. Input order is preserved.
pub fn normalize_batch(
    source: ModelSource,
    raws: &[RawRecord],
    fetched_at: DateTime<Utc>,
) -> Vec<ModelRecord> {
    raws.iter()
        .filter_map(|raw| normalize(source, raw, fetched_at))
        .collect()
}

fn normalize_ollama(listing: &OllamaListing, fetched_at: DateTime<Utc>) -> Option<ModelRecord> {
    let name = usable_name(&listing.name)?;
    let local_name = match listing.tag.as_deref().and_then(usable_name) {
        Some(tag) => format!("{}:{}", name, tag),
        None => name.to_string(),
    };

    let id = ModelSource::Ollama.qualify(&local_name);
    let display_name = name.to_string();
    let description = non_empty(listing.description.as_deref());
    let tags = clean_tags(&listing.capabilities);

    let size_label = extract_size(
        listing.tag.as_deref(),
        &display_name,
        description.as_deref(),
        &tags,
    );

    let mut metadata = BTreeMap::new();
    if let Some(pulls) = non_empty(listing.pull_count.as_deref()) {
        metadata.insert("pulls".to_string(), pulls);
    }
    if let Some(count) = non_empty(listing.tag_count.as_deref()) {
        metadata.insert("tag_count".to_string(), count);
    }
    if let Some(updated) = non_empty(listing.updated.as_deref()) {
        metadata.insert("updated".to_string(), updated);
    }
    if let Some(url) = non_empty(listing.url.as_deref()) {
        metadata.insert("url".to_string(), url);
    }
    if !listing.sizes.is_empty() {
        metadata.insert("sizes".to_string(), listing.sizes.join(","));
    }

    Some(ModelRecord {
        id,
        display_name,
        source: ModelSource::Ollama,
        size_label,
        tags,
        description,
        metadata,
        fetched_at,
    })
}

fn normalize_huggingface(listing: &HfListing, fetched_at: DateTime<Utc>) -> Option<ModelRecord> {
    let repo_id = listing
        .id
        .as_deref()
        .or(listing.model_id.as_deref())
        .and_then(usable_name)?
        .trim_matches('/');
    if repo_id.is_empty() {
        return None;
    }

    let id = ModelSource::HuggingFace.qualify(repo_id);
    let display_name = repo_id
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(repo_id)
        .to_string();
    let description = non_empty(
        listing
            .card_data
            .as_ref()
            .and_then(|card| card.description.as_deref()),
    );
    let tags = clean_tags(&listing.tags);

    let size_label = extract_size(None, &display_name, description.as_deref(), &tags);

    let mut metadata = BTreeMap::new();
    if let Some(author) = non_empty(listing.author.as_deref()) {
        metadata.insert("author".to_string(), author);
    }
    if let Some(downloads) = listing.downloads {
        metadata.insert("downloads".to_string(), downloads.to_string());
    }
    if let Some(likes) = listing.likes {
        metadata.insert("likes".to_string(), likes.to_string());
    }
    if let Some(pipeline) = non_empty(listing.pipeline_tag.as_deref()) {
        metadata.insert("pipeline_tag".to_string(), pipeline);
    }
    if let Some(library) = non_empty(listing.library_name.as_deref()) {
        metadata.insert("library".to_string(), library);
    }
    if let Some(modified) = non_empty(listing.last_modified.as_deref()) {
        metadata.insert("last_modified".to_string(), modified);
    }
    if let Some(gated) = listing.gated.as_ref() {
        metadata.insert("gated".to_string(), gated_label(gated));
    }
    if listing.private == Some(true) {
        metadata.insert("private".to_string(), "true".to_string());
    }

    Some(ModelRecord {
        id,
        display_name,
        source: ModelSource::HuggingFace,
        size_label,
        tags,
        description,
        metadata,
        fetched_at,
    })
}

// The hub reports `gated` as either `false` or a mode string ("auto", "manual").
fn gated_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
