//! Error types for the catalog core.
//!
//! `NotFound` is an ordinary outcome of lookups; the refresh variants always
//! say which source failed and whether the cache file was touched.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::ModelSource;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("model '{id}' not found in the catalog")]
    NotFound { id: String },

    #[error("invalid model id: {0}")]
    InvalidId(String),

    #[error("{operation} of {upstream} failed, cache unchanged: {cause}")]
    Refresh {
        operation: SyncOp,
        upstream: ModelSource,
        #[source]
        cause: FetchError,
    },

    #[error("cache file {path:?} is corrupt: {message}")]
    CacheCorrupt { path: PathBuf, message: String },

    #[error("failed to write cache file {path:?}, previous cache preserved: {source}")]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} of {upstream} could not save {path:?}, previous cache preserved: {source}")]
    RefreshWrite {
        operation: SyncOp,
        upstream: ModelSource,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Which catalog update an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    /// Full re-fetch of one source.
    Refresh,
    /// Query-scoped fetch merged into the catalog.
    Discover,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncOp::Refresh => "refresh",
            SyncOp::Discover => "discover",
        })
    }
}

/// Failure of one remote source adapter.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{adapter}: source unreachable: {message}")]
    SourceUnreachable { adapter: String, message: String },

    #[error("{adapter}: rate limited{}", retry_hint(.retry_after_secs))]
    RateLimited {
        adapter: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{adapter}: could not parse response: {message}")]
    ParseFailed { adapter: String, message: String },

    #[error("no adapter configured for {0}")]
    NoAdapter(ModelSource),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|s| format!(", retry after {}s", s))
        .unwrap_or_default()
}

/// Failure talking to the local model runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("cannot reach Ollama at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("Ollama returned {status} for {operation}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{operation} failed: {message}")]
    Stream { operation: String, message: String },
}
