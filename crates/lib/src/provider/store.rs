//! Persisted provider records.
//!
//! # Storage Layout
//!
//! ```text
//! {cache_dir}/providers/
//! └── <environment fingerprint>/
//!     └── <checksum>.json     # CacheEntry
//! ```
//!
//! Entries are written atomically (temp file, then rename). An entry whose
//! recorded key or record hash does not match is corrupt: it is reported,
//! removed and treated as a miss.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::consts::CACHE_ENTRY_VERSION;
use crate::ident::TargetKey;
use crate::platform::paths::providers_dir;
use crate::util::hash::{ContentHash, Hashable, ObjectHash};

use super::types::ProviderRecord;

#[derive(Debug, Error)]
pub enum CacheError {
  /// The entry exists but cannot be trusted.
  #[error("corrupted cache entry {path}: {reason}")]
  Corruption { path: PathBuf, reason: String },

  #[error("cache I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize cache entry: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// The on-disk form of a provider record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
  pub version: u32,
  pub target: TargetKey,
  pub checksum: Checksum,
  pub environment: ObjectHash,
  pub record: ProviderRecord,
  /// Hash of `record`, checked on read.
  pub record_hash: ContentHash,
}

/// Summary of what the store holds.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
  pub environments: usize,
  pub entries: usize,
  pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ProviderStore {
  base_path: PathBuf,
}

impl ProviderStore {
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  /// The store under the default cache directory.
  pub fn default_store() -> Self {
    Self::new(providers_dir())
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn environment_dir(&self, environment: &ObjectHash) -> PathBuf {
    self.base_path.join(&environment.0)
  }

  pub fn entry_path(&self, environment: &ObjectHash, checksum: &Checksum) -> PathBuf {
    self.environment_dir(environment).join(format!("{}.json", checksum.0))
  }

  /// Load the entry for `(target, environment, checksum)`.
  ///
  /// Returns `Ok(None)` when there is no entry and `CacheError::Corruption`
  /// when the entry does not match the requested key.
  pub fn load(
    &self,
    target: &TargetKey,
    environment: &ObjectHash,
    checksum: &Checksum,
  ) -> Result<Option<ProviderRecord>, CacheError> {
    let path = self.entry_path(environment, checksum);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(CacheError::Io { path, source }),
    };

    let corrupt = |reason: String| CacheError::Corruption {
      path: path.clone(),
      reason,
    };

    let entry: CacheEntry = serde_json::from_str(&content).map_err(|e| corrupt(format!("unreadable entry: {}", e)))?;

    if entry.version != CACHE_ENTRY_VERSION {
      return Err(corrupt(format!("unsupported entry version {}", entry.version)));
    }
    if &entry.target != target || &entry.record.target != target {
      return Err(corrupt(format!("entry belongs to {}", entry.target)));
    }
    if &entry.checksum != checksum || &entry.record.checksum != checksum {
      return Err(corrupt(format!("stored checksum {} does not match key", entry.checksum)));
    }
    if &entry.environment != environment {
      return Err(corrupt(format!("stored environment {} does not match key", entry.environment)));
    }
    if entry.record.compute_content_hash()? != entry.record_hash {
      return Err(corrupt("record hash mismatch".to_string()));
    }

    Ok(Some(entry.record))
  }

  /// Load an entry, recovering from corruption by removing it.
  ///
  /// Any failure is logged and reported as a miss.
  pub fn lookup(&self, target: &TargetKey, environment: &ObjectHash, checksum: &Checksum) -> Option<ProviderRecord> {
    match self.load(target, environment, checksum) {
      Ok(record) => record,
      Err(CacheError::Corruption { path, reason }) => {
        warn!(target = %target, path = ?path, reason = %reason, "discarding corrupted cache entry");
        if let Err(e) = fs::remove_file(&path)
          && e.kind() != io::ErrorKind::NotFound
        {
          warn!(path = ?path, error = %e, "failed to remove corrupted cache entry");
        }
        None
      }
      Err(e) => {
        warn!(target = %target, error = %e, "cache lookup failed, treating as miss");
        None
      }
    }
  }

  /// Persist `record` under `environment`.
  pub fn save(&self, environment: &ObjectHash, record: &ProviderRecord) -> Result<PathBuf, CacheError> {
    let dir = self.environment_dir(environment);
    fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
      path: dir.clone(),
      source,
    })?;

    let entry = CacheEntry {
      version: CACHE_ENTRY_VERSION,
      target: record.target.clone(),
      checksum: record.checksum.clone(),
      environment: environment.clone(),
      record: record.clone(),
      record_hash: record.compute_content_hash()?,
    };
    let content = serde_json::to_string_pretty(&entry)?;

    let path = self.entry_path(environment, &record.checksum);
    let io_err = |source| CacheError::Io {
      path: path.clone(),
      source,
    };

    let mut temp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    temp.write_all(content.as_bytes()).map_err(io_err)?;
    temp.persist(&path).map_err(|e| io_err(e.error))?;

    debug!(target = %record.target, path = ?path, "cached provider record");
    Ok(path)
  }

  /// Count environments, entries and bytes on disk.
  pub fn stats(&self) -> Result<StoreStats, CacheError> {
    let mut stats = StoreStats::default();
    let environments = match fs::read_dir(&self.base_path) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stats),
      Err(source) => {
        return Err(CacheError::Io {
          path: self.base_path.clone(),
          source,
        });
      }
    };

    for environment in environments.flatten() {
      if !environment.path().is_dir() {
        continue;
      }
      stats.environments += 1;
      let files = fs::read_dir(environment.path()).map_err(|source| CacheError::Io {
        path: environment.path(),
        source,
      })?;
      for file in files.flatten() {
        if file.path().extension().is_some_and(|ext| ext == "json") {
          stats.entries += 1;
          stats.bytes += file.metadata().map(|m| m.len()).unwrap_or(0);
        }
      }
    }
    Ok(stats)
  }
}
