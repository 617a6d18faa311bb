//! getllm_core - Model catalog sync and cache
//!
//! This crate provides:
//! - Source adapters for the Ollama library and the Hugging Face hub
//! - Normalization of their listings into one `ModelRecord` shape
//! - A catalog with source-scoped refresh, persisted atomically to disk
//! - The Ollama runtime adapter for installed state and installs

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod registry;
pub mod runtime;
pub mod sources;

pub use cache::{CacheStatus, CacheStore};
pub use catalog::Catalog;
pub use config::Config;
pub use error::{CatalogError, FetchError, Result, RuntimeError, SyncOp};
pub use models::{parse_model_ref, ModelRecord, ModelSource};
pub use registry::{Freshness, ListFilter, ModelRegistry};
pub use runtime::{InstalledModel, OllamaRuntime, PullProgress, Runtime};
