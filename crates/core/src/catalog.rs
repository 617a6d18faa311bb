//! The in-memory catalog and its merge rules.
//!
//! A catalog maps `(source, id)` to the most recently fetched record. All
//! operations here are pure: they take catalogs by reference and return new
//! ones, leaving persistence to [`crate::cache`].

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::models::{ModelRecord, ModelSource};

pub type CatalogKey = (ModelSource, String);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<CatalogKey, ModelRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, source: ModelSource, id: &str) -> Option<&ModelRecord> {
        self.entries.get(&(source, id.to_string()))
    }

    pub fn records(&self) -> impl Iterator<Item = &ModelRecord> {
        self.entries.values()
    }

    pub fn records_for(&self, source: ModelSource) -> impl Iterator<Item = &ModelRecord> {
        self.entries
            .iter()
            .filter(move |((s, _), _)| *s == source)
            .map(|(_, r)| r)
    }

    pub fn count_for(&self, source: ModelSource) -> usize {
        self.records_for(source).count()
    }

    /// Most recent `fetched_at` among a source's entries.
    pub fn last_fetched(&self, source: ModelSource) -> Option<DateTime<Utc>> {
        self.records_for(source).map(|r| r.fetched_at).max()
    }

    fn insert(&mut self, record: ModelRecord) {
        self.entries
            .insert((record.source, record.id.clone()), record);
    }
}

impl FromIterator<ModelRecord> for Catalog {
    /// Later records replace earlier ones with the same key.
    fn from_iter<I: IntoIterator<Item = ModelRecord>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for record in iter {
            catalog.insert(record);
        }
        catalog
    }
}

/// Collapse duplicate keys within one fetch; the last occurrence wins.
/// The survivors keep the position of their first occurrence.
pub fn dedupe_batch(batch: Vec<ModelRecord>) -> Vec<ModelRecord> {
    let mut position: BTreeMap<CatalogKey, usize> = BTreeMap::new();
    let mut out: Vec<ModelRecord> = Vec::with_capacity(batch.len());

    for record in batch {
        let key = (record.source, record.id.clone());
        match position.get(&key) {
            Some(&i) => out[i] = record,
            None => {
                position.insert(key, out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Key-by-key overwrite: every key in `batch` replaces or inserts, every other
/// existing entry is kept unchanged.
pub fn merge(existing: &Catalog, batch: Vec<ModelRecord>) -> Catalog {
    let mut updated = existing.clone();
    for record in dedupe_batch(batch) {
        updated.insert(record);
    }
    updated
}

/// Source-scoped full replace: after this, the entries for `source` are
/// exactly the keys in `batch`. Other sources are untouched. Records in
/// `batch` that belong to another source are ignored.
pub fn replace_source(existing: &Catalog, source: ModelSource, batch: Vec<ModelRecord>) -> Catalog {
    let mut updated = Catalog {
        entries: existing
            .entries
            .iter()
            .filter(|((s, _), _)| *s != source)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    };

    for record in dedupe_batch(batch) {
        if record.source == source {
            updated.insert(record);
        } else {
            tracing::warn!(
                "Ignoring {} record {} in a {} refresh",
                record.source,
                record.id,
                source
            );
        }
    }
    updated
}
