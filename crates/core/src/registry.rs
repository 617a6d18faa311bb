//! Catalog query facade.
//!
//! [`ModelRegistry`] is the only entry point the CLI uses. It holds no catalog
//! state of its own: callers load a [`Catalog`], pass it in, and get updated
//! catalogs back from the operations that change it.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::info;

use crate::cache::{CacheLoad, CacheStore};
use crate::catalog::{merge, replace_source, Catalog};
use crate::config::Config;
use crate::error::{CatalogError, Result, SyncOp};
use crate::models::{ModelRecord, ModelSource};
use crate::normalize::normalize_batch;
use crate::runtime::{runtime_tag, OllamaRuntime, ProgressFn, Runtime};
use crate::sources::{AdapterSet, FetchRequest, HuggingFaceApiAdapter, OllamaLibraryAdapter};

/// Source of `fetched_at` timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Filters for [`ModelRegistry::list`]; all set filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub source: Option<ModelSource>,
    pub installed_only: bool,
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Listings requested per refresh; `None` leaves it to the adapter.
    pub limit: Option<usize>,
    pub stale_after: Duration,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            limit: None,
            stale_after: Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No cached entries for the source.
    Empty,
    Fresh(DateTime<Utc>),
    Stale(DateTime<Utc>),
}

impl Freshness {
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, Freshness::Fresh(_))
    }

    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        match self {
            Freshness::Empty => None,
            Freshness::Fresh(at) | Freshness::Stale(at) => Some(*at),
        }
    }
}

pub struct ModelRegistry {
    store: CacheStore,
    adapters: AdapterSet,
    runtime: Box<dyn Runtime>,
    clock: Box<dyn Clock>,
    options: RefreshOptions,
}

impl ModelRegistry {
    pub fn new(store: CacheStore, adapters: AdapterSet, runtime: Box<dyn Runtime>) -> Self {
        Self {
            store,
            adapters,
            runtime,
            clock: Box::new(SystemClock),
            options: RefreshOptions::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_options(mut self, options: RefreshOptions) -> Self {
        self.options = options;
        self
    }

    /// Wire up the default adapters, the Ollama runtime and the cache directory
    /// named by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let sources = &config.sources;
        let adapters = AdapterSet::new()
            .with(
                OllamaLibraryAdapter::library(&sources.ollama_url, sources.timeout())
                    .context("Failed to create Ollama library client")?,
            )
            .with(
                OllamaLibraryAdapter::search(&sources.ollama_url, sources.timeout())
                    .context("Failed to create Ollama search client")?,
            )
            .with(
                HuggingFaceApiAdapter::new(
                    &sources.huggingface_url,
                    sources.hf_token.clone(),
                    &sources.hf_search,
                    sources.timeout(),
                )
                .context("Failed to create Hugging Face client")?,
            );

        let runtime = OllamaRuntime::new(&config.ollama.host, config.ollama.timeout())
            .context("Failed to create Ollama client")?;

        let options = RefreshOptions {
            limit: Some(sources.limit),
            stale_after: sources.stale_after(),
        };

        Ok(Self::new(
            CacheStore::new(config.cache_dir()?),
            adapters,
            Box::new(runtime),
        )
        .with_options(options))
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    pub fn load(&self) -> Catalog {
        self.store.load()
    }

    pub fn load_with_status(&self) -> CacheLoad {
        self.store.load_with_status()
    }

    /// Records matching `filter`, ordered by display name then id.
    ///
    /// `installed_only` asks the runtime once for the installed set; that
    /// query failing fails the listing.
    pub async fn list(
        &self,
        catalog: &Catalog,
        filter: &ListFilter,
        limit: Option<usize>,
    ) -> Result<Vec<ModelRecord>> {
        let installed: Option<HashSet<String>> = if filter.installed_only {
            let models = self.runtime.list_installed().await?;
            Some(models.into_iter().map(|m| m.name.to_lowercase()).collect())
        } else {
            None
        };

        let mut records: Vec<ModelRecord> = catalog
            .records()
            .filter(|r| filter.source.map_or(true, |s| r.source == s))
            .filter(|r| filter.query.as_deref().map_or(true, |q| r.matches(q)))
            .filter(|r| match &installed {
                Some(names) => runtime_tag(&r.id)
                    .map(|tag| names.contains(&tag.to_lowercase()))
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();

        records.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    pub fn get<'a>(
        &self,
        catalog: &'a Catalog,
        source: ModelSource,
        id: &str,
    ) -> Result<&'a ModelRecord> {
        catalog
            .get(source, id)
            .ok_or_else(|| CatalogError::NotFound { id: id.to_string() })
    }

    /// Re-fetch `source` and replace its portion of the catalog.
    ///
    /// Only `source`'s cache file is rewritten, so a concurrent refresh of
    /// another source cannot be undone by this one. On any failure the cache
    /// is left as it was and the error names the source.
    pub async fn refresh(&self, catalog: &Catalog, source: ModelSource) -> Result<Catalog> {
        let request = FetchRequest::new(None, self.options.limit);
        let batch = self
            .fetch_records(SyncOp::Refresh, source, &request)
            .await?;
        let count = batch.len();

        let updated = replace_source(catalog, source, batch);
        self.save_for(SyncOp::Refresh, source, &updated)?;
        info!("Refreshed {}: {} models cached", source, count);
        Ok(updated)
    }

    /// Query `source` for `query` and fold the results into the catalog
    /// without evicting anything.
    pub async fn discover(
        &self,
        catalog: &Catalog,
        source: ModelSource,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Catalog> {
        let request = FetchRequest::new(Some(query.to_string()), limit.or(self.options.limit));
        let batch = self
            .fetch_records(SyncOp::Discover, source, &request)
            .await?;
        let count = batch.len();

        let updated = merge(catalog, batch);
        self.save_for(SyncOp::Discover, source, &updated)?;
        info!("Discovered {} {} models for '{}'", count, source, query);
        Ok(updated)
    }

    async fn fetch_records(
        &self,
        operation: SyncOp,
        source: ModelSource,
        request: &FetchRequest,
    ) -> Result<Vec<ModelRecord>> {
        let raws = self
            .adapters
            .fetch(source, request)
            .await
            .map_err(|cause| CatalogError::Refresh {
                operation,
                upstream: source,
                cause,
            })?;
        Ok(normalize_batch(source, &raws, self.clock.now()))
    }

    fn save_for(&self, operation: SyncOp, source: ModelSource, catalog: &Catalog) -> Result<()> {
        self.store.save_source(catalog, source).map_err(|e| match e {
            CatalogError::CacheWrite { path, source: io } => CatalogError::RefreshWrite {
                operation,
                upstream: source,
                path,
                source: io,
            },
            other => other,
        })
    }

    /// Live query; installed state is never cached.
    pub async fn is_installed(&self, source: ModelSource, id: &str) -> Result<bool> {
        if source.local_name(id).is_none() {
            return Err(CatalogError::InvalidId(format!(
                "'{}' is not a {} id",
                id, source
            )));
        }
        self.runtime.is_installed(id).await
    }

    pub async fn install(&self, id: &str, progress: ProgressFn<'_>) -> Result<()> {
        self.runtime.install(id, progress).await
    }

    pub async fn uninstall(&self, id: &str) -> Result<()> {
        self.runtime.uninstall(id).await
    }

    pub fn freshness(&self, catalog: &Catalog, source: ModelSource) -> Freshness {
        match catalog.last_fetched(source) {
            None => Freshness::Empty,
            Some(at) if self.clock.now() - at > self.options.stale_after => Freshness::Stale(at),
            Some(at) => Freshness::Fresh(at),
        }
    }

    /// Sources that are empty or older than the staleness threshold.
    pub fn stale_sources(&self, catalog: &Catalog) -> Vec<ModelSource> {
        ModelSource::ALL
            .into_iter()
            .filter(|s| self.freshness(catalog, *s).needs_refresh())
            .collect()
    }
}
