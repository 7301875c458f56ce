//! Build manifests and the sources that supply them.
//!
//! The engine never parses manifest syntax beyond deserializing the JSON
//! declaration format; anything able to produce a [`Manifest`] can implement
//! [`ManifestSource`].

mod types;

pub use types::*;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::MANIFEST_FORMAT_VERSION;

/// Errors raised while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse manifest: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("unsupported manifest version '{found}' (expected '{expected}')")]
  UnsupportedVersion { found: String, expected: &'static str },
}

/// Supplies the parsed declaration set.
pub trait ManifestSource {
  fn load(&self) -> Result<Manifest, ManifestError>;
}

impl Manifest {
  /// Parse a manifest from JSON, checking the declared format version.
  pub fn from_json_str(content: &str) -> Result<Self, ManifestError> {
    let manifest: Manifest = serde_json::from_str(content)?;
    if let Some(found) = &manifest.required_version
      && found != MANIFEST_FORMAT_VERSION
    {
      return Err(ManifestError::UnsupportedVersion {
        found: found.clone(),
        expected: MANIFEST_FORMAT_VERSION,
      });
    }
    Ok(manifest)
  }

  /// Resolve relative package paths against `base`.
  pub fn rebase(mut self, base: &Path) -> Self {
    for package in &mut self.packages {
      if package.path.is_relative() {
        package.path = base.join(&package.path);
      }
    }
    self
  }
}

/// A JSON manifest on disk. Package paths are relative to the file's directory.
#[derive(Debug, Clone)]
pub struct JsonManifestFile {
  path: PathBuf,
}

impl JsonManifestFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl ManifestSource for JsonManifestFile {
  fn load(&self) -> Result<Manifest, ManifestError> {
    debug!(path = ?self.path, "loading manifest");
    let content = std::fs::read_to_string(&self.path).map_err(|source| ManifestError::Read {
      path: self.path.clone(),
      source,
    })?;

    let base = self
      .path
      .parent()
      .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
      .unwrap_or(Path::new("."));
    let base = dunce::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());

    Ok(Manifest::from_json_str(&content)?.rebase(&base))
  }
}
