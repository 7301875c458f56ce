//! Source-file globbing.
//!
//! The engine never interprets pattern syntax itself; it hands a package root
//! and a list of patterns to a [`Globber`] and consumes the ordered file list.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::trace;
use walkdir::WalkDir;

#[derive(Debug, Clone, Error)]
pub enum GlobError {
  #[error("invalid glob pattern '{pattern}': {message}")]
  Pattern { pattern: String, message: String },

  #[error("failed to walk {root}: {message}")]
  Walk { root: PathBuf, message: String },
}

/// Resolves patterns rooted at a directory into a sorted, de-duplicated file list.
pub trait Globber: Send + Sync {
  fn glob(&self, root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, GlobError>;
}

/// Filesystem globber: `*` stays within one path segment, `**` spans any
/// number of them and `{a,b}` alternates.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsGlobber;

impl FsGlobber {
  fn compile(patterns: &[String]) -> Result<GlobSet, GlobError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
      let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| GlobError::Pattern {
          pattern: pattern.clone(),
          message: e.to_string(),
        })?;
      builder.add(glob);
    }
    builder.build().map_err(|e| GlobError::Pattern {
      pattern: patterns.join(", "),
      message: e.to_string(),
    })
  }
}

impl Globber for FsGlobber {
  fn glob(&self, root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, GlobError> {
    if patterns.is_empty() || !root.is_dir() {
      return Ok(Vec::new());
    }
    let set = Self::compile(patterns)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
      let entry = entry.map_err(|e| GlobError::Walk {
        root: root.to_path_buf(),
        message: e.to_string(),
      })?;
      if !entry.file_type().is_file() {
        continue;
      }
      let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
      if set.is_match(relative) {
        files.push(entry.path().to_path_buf());
      }
    }

    files.sort();
    files.dedup();
    trace!(root = ?root, patterns = ?patterns, matched = files.len(), "globbed sources");
    Ok(files)
  }
}
