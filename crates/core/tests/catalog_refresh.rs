use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use getllm_core::registry::{FixedClock, Freshness, ListFilter, ModelRegistry};
use getllm_core::runtime::{model_id_from_runtime, InstalledModel, ProgressFn, Runtime};
use getllm_core::sources::{
    AdapterSet, FetchRequest, HfListing, OllamaListing, RawRecord, SourceAdapter,
};
use getllm_core::error::SyncOp;
use getllm_core::{CacheStore, Catalog, CatalogError, FetchError, ModelSource};

/// Upstream listings shared between a test and its adapter. `None` makes the
/// adapter fail as if the source were down.
#[derive(Clone, Default)]
struct Upstream {
    listings: Arc<Mutex<Option<Vec<RawRecord>>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl Upstream {
    fn serve(&self, listings: Vec<RawRecord>) {
        *self.listings.lock().unwrap() = Some(listings);
    }

    fn go_down(&self) {
        *self.listings.lock().unwrap() = None;
    }
}

struct MockAdapter {
    source: ModelSource,
    upstream: Upstream,
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn source(&self) -> ModelSource {
        self.source
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchError> {
        self.upstream.requests.lock().unwrap().push(request.clone());
        self.upstream
            .listings
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::SourceUnreachable {
                adapter: "mock".into(),
                message: "connection refused".into(),
            })
    }
}

struct MockRuntime {
    installed: Vec<String>,
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn list_installed(&self) -> getllm_core::Result<Vec<InstalledModel>> {
        Ok(self
            .installed
            .iter()
            .map(|name| InstalledModel {
                name: name.clone(),
                id: model_id_from_runtime(name),
                size: None,
                modified_at: None,
            })
            .collect())
    }

    async fn install(&self, _id: &str, _progress: ProgressFn<'_>) -> getllm_core::Result<()> {
        Ok(())
    }

    async fn uninstall(&self, _id: &str) -> getllm_core::Result<()> {
        Ok(())
    }

    async fn version(&self) -> getllm_core::Result<String> {
        Ok("mock".into())
    }
}

struct Harness {
    _dir: TempDir,
    path: PathBuf,
    ollama: Upstream,
    hf: Upstream,
    registry: ModelRegistry,
}

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn harness_at(path: PathBuf, dir: TempDir, installed: &[&str]) -> Harness {
    let ollama = Upstream::default();
    let hf = Upstream::default();
    let adapters = AdapterSet::new()
        .with(MockAdapter {
            source: ModelSource::Ollama,
            upstream: ollama.clone(),
        })
        .with(MockAdapter {
            source: ModelSource::HuggingFace,
            upstream: hf.clone(),
        });
    let runtime = MockRuntime {
        installed: installed.iter().map(|s| s.to_string()).collect(),
    };
    let registry = ModelRegistry::new(CacheStore::new(&path), adapters, Box::new(runtime))
        .with_clock(FixedClock(now()));

    Harness {
        _dir: dir,
        path,
        ollama,
        hf,
        registry,
    }
}

fn harness(installed: &[&str]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache");
    harness_at(path, dir, installed)
}

impl Harness {
    fn cache_file(&self, source: ModelSource) -> PathBuf {
        self.registry.store().source_path(source)
    }

    /// A second registry over the same cache directory, as another process
    /// would see it.
    fn sibling(&self) -> (Upstream, Upstream, ModelRegistry) {
        let ollama = Upstream::default();
        let hf = Upstream::default();
        let adapters = AdapterSet::new()
            .with(MockAdapter {
                source: ModelSource::Ollama,
                upstream: ollama.clone(),
            })
            .with(MockAdapter {
                source: ModelSource::HuggingFace,
                upstream: hf.clone(),
            });
        let registry = ModelRegistry::new(
            CacheStore::new(&self.path),
            adapters,
            Box::new(MockRuntime { installed: vec![] }),
        )
        .with_clock(FixedClock(now()));
        (ollama, hf, registry)
    }
}

fn ollama(name: &str, tag: Option<&str>, description: &str) -> RawRecord {
    RawRecord::Ollama(OllamaListing {
        name: name.to_string(),
        tag: tag.map(str::to_string),
        description: Some(description.to_string()),
        capabilities: vec!["tools".to_string()],
        ..Default::default()
    })
}

fn hf(repo: &str, tags: &[&str]) -> RawRecord {
    RawRecord::HuggingFace(HfListing {
        id: Some(repo.to_string()),
        downloads: Some(1000),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    })
}

fn ids(catalog: &Catalog, source: ModelSource) -> Vec<String> {
    catalog.records_for(source).map(|r| r.id.clone()).collect()
}

#[tokio::test]
async fn refresh_is_idempotent_for_unchanged_upstream() {
    let h = harness(&[]);
    h.ollama.serve(vec![
        ollama("llama3", Some("8b"), "Meta Llama 3"),
        ollama("phi3", None, "Small model"),
    ]);

    let first = h
        .registry
        .refresh(&Catalog::new(), ModelSource::Ollama)
        .await
        .unwrap();
    let first_bytes = fs::read(h.cache_file(ModelSource::Ollama)).unwrap();

    let second = h
        .registry
        .refresh(&first, ModelSource::Ollama)
        .await
        .unwrap();
    let second_bytes = fs::read(h.cache_file(ModelSource::Ollama)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn refreshing_one_source_never_touches_another() {
    let h = harness(&[]);
    h.hf.serve(vec![hf("TheBloke/Mistral-7B-GGUF", &["gguf"])]);
    h.ollama.serve(vec![ollama("mistral", Some("7b"), "Mistral")]);

    let catalog = h
        .registry
        .refresh(&Catalog::new(), ModelSource::HuggingFace)
        .await
        .unwrap();
    let hf_before: Vec<_> = catalog
        .records_for(ModelSource::HuggingFace)
        .cloned()
        .collect();

    h.ollama.serve(vec![]);
    let catalog = h
        .registry
        .refresh(&catalog, ModelSource::Ollama)
        .await
        .unwrap();
    let hf_after: Vec<_> = catalog
        .records_for(ModelSource::HuggingFace)
        .cloned()
        .collect();

    assert_eq!(hf_before, hf_after);
    assert_eq!(catalog.count_for(ModelSource::Ollama), 0);
    assert_eq!(h.registry.load(), catalog);
}

#[tokio::test]
async fn interleaved_registries_keep_each_others_sources() {
    let a = harness(&[]);
    let (_b_ollama, b_hf, b) = a.sibling();

    // Both start from the same empty cache before either writes.
    let seen_by_a = a.registry.load();
    let seen_by_b = b.load();

    a.ollama.serve(vec![ollama("phi3", None, "Small model")]);
    b_hf.serve(vec![hf("openai-community/gpt2", &[])]);

    a.registry
        .refresh(&seen_by_a, ModelSource::Ollama)
        .await
        .unwrap();
    b.refresh(&seen_by_b, ModelSource::HuggingFace)
        .await
        .unwrap();

    let on_disk = a.registry.load();
    assert_eq!(ids(&on_disk, ModelSource::Ollama), vec!["ollama/phi3"]);
    assert_eq!(
        ids(&on_disk, ModelSource::HuggingFace),
        vec!["huggingface/openai-community/gpt2"]
    );
    assert_eq!(b.load(), on_disk);

    // A later refresh of one source from a stale snapshot still leaves the
    // other source's file alone.
    a.ollama.serve(vec![ollama("llama3", Some("8b"), "Meta Llama 3")]);
    a.registry
        .refresh(&seen_by_a, ModelSource::Ollama)
        .await
        .unwrap();
    let on_disk = b.load();
    assert_eq!(ids(&on_disk, ModelSource::Ollama), vec!["ollama/llama3:8b"]);
    assert_eq!(
        ids(&on_disk, ModelSource::HuggingFace),
        vec!["huggingface/openai-community/gpt2"]
    );
}

#[tokio::test]
async fn refresh_replaces_the_whole_source() {
    let h = harness(&[]);
    h.ollama.serve(vec![
        ollama("alpha", None, "A"),
        ollama("beta", None, "B"),
    ]);
    let catalog = h
        .registry
        .refresh(&Catalog::new(), ModelSource::Ollama)
        .await
        .unwrap();

    h.ollama.serve(vec![
        ollama("beta", None, "B prime"),
        ollama("gamma", None, "C"),
    ]);
    let catalog = h
        .registry
        .refresh(&catalog, ModelSource::Ollama)
        .await
        .unwrap();

    assert_eq!(
        ids(&catalog, ModelSource::Ollama),
        vec!["ollama/beta", "ollama/gamma"]
    );
    let beta = h
        .registry
        .get(&catalog, ModelSource::Ollama, "ollama/beta")
        .unwrap();
    assert_eq!(beta.description.as_deref(), Some("B prime"));
}

#[tokio::test]
async fn duplicate_listings_keep_the_last_one() {
    let h = harness(&[]);
    h.ollama.serve(vec![
        ollama("qwen2", Some("7b"), "first page"),
        ollama("qwen2", Some("7b"), "second page"),
    ]);

    let catalog = h
        .registry
        .refresh(&Catalog::new(), ModelSource::Ollama)
        .await
        .unwrap();
    assert_eq!(catalog.len(), 1);
    let record = catalog.get(ModelSource::Ollama, "ollama/qwen2:7b").unwrap();
    assert_eq!(record.description.as_deref(), Some("second page"));
    assert_eq!(record.size_label.as_deref(), Some("7B"));
    assert_eq!(record.fetched_at, now());
}

#[tokio::test]
async fn failed_refresh_leaves_cache_unchanged() {
    let h = harness(&[]);
    h.ollama.serve(vec![ollama("phi3", None, "Small model")]);
    let catalog = h
        .registry
        .refresh(&Catalog::new(), ModelSource::Ollama)
        .await
        .unwrap();
    let before = fs::read(h.cache_file(ModelSource::Ollama)).unwrap();

    h.ollama.go_down();
    let err = h
        .registry
        .refresh(&catalog, ModelSource::Ollama)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CatalogError::Refresh {
            operation: SyncOp::Refresh,
            upstream: ModelSource::Ollama,
            cause: FetchError::SourceUnreachable { .. },
        }
    ));
    assert!(err.to_string().contains("cache unchanged"));
    assert_eq!(fs::read(h.cache_file(ModelSource::Ollama)).unwrap(), before);
    assert_eq!(h.registry.load(), catalog);
}

#[tokio::test]
async fn unwritable_cache_fails_refresh_with_source() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "file in the way").unwrap();
    let h = harness_at(blocker.join("cache"), dir, &[]);
    h.hf.serve(vec![hf("gpt2", &[])]);

    let err = h
        .registry
        .refresh(&Catalog::new(), ModelSource::HuggingFace)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::RefreshWrite {
            upstream: ModelSource::HuggingFace,
            ..
        }
    ));
}

#[tokio::test]
async fn corrupt_cache_recovers_as_empty() {
    let h = harness(&[]);
    fs::create_dir_all(&h.path).unwrap();
    fs::write(
        h.cache_file(ModelSource::Ollama),
        "{\"version\": 1, \"source\": \"ollama\", \"records\": [",
    )
    .unwrap();

    let catalog = h.registry.load();
    assert!(catalog.is_empty());

    h.ollama.serve(vec![ollama("phi3", None, "Small model")]);
    let catalog = h
        .registry
        .refresh(&catalog, ModelSource::Ollama)
        .await
        .unwrap();
    assert_eq!(h.registry.load(), catalog);
}

#[tokio::test]
async fn list_filters_and_orders() {
    let h = harness(&[]);
    h.ollama.serve(vec![
        ollama("codellama", Some("7b"), "A LLaMA for code"),
        ollama("codellama", Some("13b"), "A LLaMA for code"),
        ollama("mistral", Some("7b"), "Fast general model"),
    ]);
    h.hf.serve(vec![
        hf("TheBloke/CodeLlama-7B-Instruct-GGUF", &["gguf", "code"]),
        hf("openai-community/gpt2", &["text-generation"]),
    ]);
    let catalog = h
        .registry
        .refresh(&Catalog::new(), ModelSource::Ollama)
        .await
        .unwrap();
    let catalog = h
        .registry
        .refresh(&catalog, ModelSource::HuggingFace)
        .await
        .unwrap();

    let all = h
        .registry
        .list(&catalog, &ListFilter::default(), None)
        .await
        .unwrap();
    let order: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "huggingface/TheBloke/CodeLlama-7B-Instruct-GGUF",
            "ollama/codellama:13b",
            "ollama/codellama:7b",
            "huggingface/openai-community/gpt2",
            "ollama/mistral:7b",
        ]
    );

    let filter = ListFilter {
        query: Some("LLAMA".into()),
        ..Default::default()
    };
    let found = h.registry.list(&catalog, &filter, None).await.unwrap();
    assert_eq!(found.len(), 3);

    let filter = ListFilter {
        source: Some(ModelSource::Ollama),
        query: Some("code".into()),
        ..Default::default()
    };
    let found = h.registry.list(&catalog, &filter, Some(1)).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "ollama/codellama:13b");

    let filter = ListFilter {
        query: Some("text-generation".into()),
        ..Default::default()
    };
    let found = h.registry.list(&catalog, &filter, None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].display_name, "gpt2");
}

#[tokio::test]
async fn installed_filter_asks_the_runtime() {
    let h = harness(&["mistral:7b", "hf.co/openai-community/gpt2:latest"]);
    h.ollama.serve(vec![
        ollama("mistral", Some("7b"), "Fast general model"),
        ollama("phi3", None, "Small model"),
    ]);
    h.hf.serve(vec![hf("openai-community/gpt2", &[])]);
    let catalog = h
        .registry
        .refresh(&Catalog::new(), ModelSource::Ollama)
        .await
        .unwrap();
    let catalog = h
        .registry
        .refresh(&catalog, ModelSource::HuggingFace)
        .await
        .unwrap();

    let filter = ListFilter {
        installed_only: true,
        ..Default::default()
    };
    let installed = h.registry.list(&catalog, &filter, None).await.unwrap();
    let installed: Vec<_> = installed.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        installed,
        vec!["huggingface/openai-community/gpt2", "ollama/mistral:7b"]
    );

    assert!(h
        .registry
        .is_installed(ModelSource::Ollama, "ollama/mistral:7b")
        .await
        .unwrap());
    assert!(!h
        .registry
        .is_installed(ModelSource::Ollama, "ollama/phi3")
        .await
        .unwrap());
    assert!(h
        .registry
        .is_installed(ModelSource::HuggingFace, "ollama/phi3")
        .await
        .is_err());
}

#[tokio::test]
async fn get_reports_missing_ids() {
    let h = harness(&[]);
    let err = h
        .registry
        .get(&Catalog::new(), ModelSource::Ollama, "ollama/nope")
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { ref id } if id == "ollama/nope"));
}

#[tokio::test]
async fn discover_merges_without_evicting() {
    let h = harness(&[]);
    h.hf.serve(vec![hf("openai-community/gpt2", &[])]);
    let catalog = h
        .registry
        .refresh(&Catalog::new(), ModelSource::HuggingFace)
        .await
        .unwrap();

    h.hf.serve(vec![hf("speakleash/Bielik-7B-Instruct-v0.1-GGUF", &["gguf"])]);
    let catalog = h
        .registry
        .discover(&catalog, ModelSource::HuggingFace, "bielik", Some(5))
        .await
        .unwrap();

    assert_eq!(
        ids(&catalog, ModelSource::HuggingFace),
        vec![
            "huggingface/openai-community/gpt2",
            "huggingface/speakleash/Bielik-7B-Instruct-v0.1-GGUF",
        ]
    );
    let last = h.hf.requests.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.query.as_deref(), Some("bielik"));
    assert_eq!(last.limit, Some(5));
    assert_eq!(h.registry.load(), catalog);
}

#[tokio::test]
async fn failed_discover_names_the_operation() {
    let h = harness(&[]);
    h.hf.go_down();

    let err = h
        .registry
        .discover(&Catalog::new(), ModelSource::HuggingFace, "bielik", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CatalogError::Refresh {
            operation: SyncOp::Discover,
            upstream: ModelSource::HuggingFace,
            ..
        }
    ));
    let message = err.to_string();
    assert!(message.starts_with("discover of huggingface failed"), "{}", message);
    assert!(!h.cache_file(ModelSource::HuggingFace).exists());
}

#[tokio::test]
async fn staleness_follows_the_newest_fetch() {
    let h = harness(&[]);
    assert_eq!(
        h.registry.freshness(&Catalog::new(), ModelSource::Ollama),
        Freshness::Empty
    );

    let dir = tempfile::tempdir().unwrap();
    let old = harness_at(dir.path().join("cache"), dir, &[]);
    old.ollama.serve(vec![ollama("phi3", None, "Small model")]);
    let catalog = old
        .registry
        .refresh(&Catalog::new(), ModelSource::Ollama)
        .await
        .unwrap();

    let later = ModelRegistry::new(
        CacheStore::new(&old.path),
        AdapterSet::new(),
        Box::new(MockRuntime { installed: vec![] }),
    )
    .with_clock(FixedClock(now() + Duration::hours(30)));

    assert_eq!(
        later.freshness(&catalog, ModelSource::Ollama),
        Freshness::Stale(now())
    );
    assert_eq!(
        old.registry.freshness(&catalog, ModelSource::Ollama),
        Freshness::Fresh(now())
    );
    assert_eq!(
        later.stale_sources(&catalog),
        vec![ModelSource::Ollama, ModelSource::HuggingFace]
    );
    assert_eq!(
        old.registry.stale_sources(&catalog),
        vec![ModelSource::HuggingFace]
    );
}
