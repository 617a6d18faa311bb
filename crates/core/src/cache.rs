//! Durable catalog storage.
//!
//! Each source's listings live in their own JSON file inside the cache
//! directory (`ollama.json`, `huggingface.json`), so writing one source never
//! rewrites another. Writes go to a temp file in the same directory which is
//! fsynced and then renamed over the target, so readers only ever see a
//! complete file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::error::{CatalogError, Result};
use crate::models::{ModelRecord, ModelSource};

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SourceFile {
    version: u32,
    source: ModelSource,
    records: Vec<ModelRecord>,
}

impl SourceFile {
    fn from_catalog(catalog: &Catalog, source: ModelSource) -> Self {
        Self {
            version: CACHE_VERSION,
            source,
            records: catalog.records_for(source).cloned().collect(),
        }
    }

    fn into_records(self, expected: ModelSource, path: &Path) -> Result<Vec<ModelRecord>> {
        let corrupt = |message: String| CatalogError::CacheCorrupt {
            path: path.to_path_buf(),
            message,
        };

        if self.version != CACHE_VERSION {
            return Err(corrupt(format!("unsupported cache version {}", self.version)));
        }
        if self.source != expected {
            return Err(corrupt(format!(
                "file holds {} listings, expected {}",
                self.source, expected
            )));
        }
        if let Some(record) = self
            .records
            .iter()
            .find(|r| r.source != expected || expected.local_name(&r.id).is_none())
        {
            return Err(corrupt(format!(
                "record '{}' filed under {}",
                record.id, expected
            )));
        }
        Ok(self.records)
    }
}

/// Outcome of a lenient [`CacheStore::load_with_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Missing,
    Loaded,
    /// At least one source file could not be used; its listings were treated
    /// as empty.
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct CacheLoad {
    pub catalog: Catalog,
    pub status: CacheStatus,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self, source: ModelSource) -> PathBuf {
        self.dir.join(format!("{}.json", source.as_str()))
    }

    /// Strict read of one source: `Ok(None)` when its file does not exist,
    /// `CacheCorrupt` when it cannot be read or parsed.
    pub fn read_source(&self, source: ModelSource) -> Result<Option<Vec<ModelRecord>>> {
        let path = self.source_path(source);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CatalogError::CacheCorrupt {
                    path,
                    message: e.to_string(),
                })
            }
        };

        let file: SourceFile =
            serde_json::from_str(&content).map_err(|e| CatalogError::CacheCorrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;
        file.into_records(source, &path).map(Some)
    }

    /// Strict read of every source: `Ok(None)` when no source file exists.
    pub fn read(&self) -> Result<Option<Catalog>> {
        let mut found = false;
        let mut records = Vec::new();
        for source in ModelSource::ALL {
            if let Some(batch) = self.read_source(source)? {
                found = true;
                records.extend(batch);
            }
        }
        Ok(found.then(|| records.into_iter().collect()))
    }

    /// Lenient read that never fails. A missing or corrupt source file yields
    /// no listings for that source; the others still load.
    pub fn load_with_status(&self) -> CacheLoad {
        let mut found = false;
        let mut problems = Vec::new();
        let mut records = Vec::new();

        for source in ModelSource::ALL {
            match self.read_source(source) {
                Ok(Some(batch)) => {
                    found = true;
                    records.extend(batch);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Ignoring unusable {} cache: {}", source, e);
                    problems.push(e.to_string());
                }
            }
        }

        let catalog: Catalog = records.into_iter().collect();
        let status = if !problems.is_empty() {
            CacheStatus::Corrupt(problems.join("; "))
        } else if found {
            debug!("Loaded {} cached models from {:?}", catalog.len(), self.dir);
            CacheStatus::Loaded
        } else {
            CacheStatus::Missing
        };
        CacheLoad { catalog, status }
    }

    pub fn load(&self) -> Catalog {
        self.load_with_status().catalog
    }

    /// Atomically write one source's listings. Other sources' files are not
    /// touched.
    pub fn save_source(&self, catalog: &Catalog, source: ModelSource) -> Result<()> {
        self.stage(catalog, source)?.commit()
    }

    /// Write every source's file, one atomic rename each.
    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        for source in ModelSource::ALL {
            self.save_source(catalog, source)?;
        }
        Ok(())
    }

    /// First half of [`save_source`](Self::save_source): the listings are
    /// written and synced to a temp file next to the target, which is left
    /// untouched until [`StagedCache::commit`].
    pub fn stage(&self, catalog: &Catalog, source: ModelSource) -> Result<StagedCache> {
        let target = self.source_path(source);
        let write_err = |source: std::io::Error| CatalogError::CacheWrite {
            path: target.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(write_err)?;

        let mut content = serde_json::to_string_pretty(&SourceFile::from_catalog(catalog, source))
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        content.push('\n');

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        temp.write_all(content.as_bytes()).map_err(write_err)?;
        temp.flush().map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;

        Ok(StagedCache { temp, target })
    }
}

/// A fully written source file waiting to be renamed into place. Dropping it
/// without committing removes the temp file and leaves the cache as it was.
pub struct StagedCache {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedCache {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| CatalogError::CacheWrite {
                path: target.clone(),
                source: e.error,
            })?;
        debug!("Wrote model cache {:?}", target);
        Ok(())
    }
}
