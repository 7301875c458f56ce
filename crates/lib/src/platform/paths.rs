//! Filesystem locations for the provider cache and build outputs.
//!
//! Both can be overridden through environment variables; otherwise they
//! follow the XDG cache directory convention (`%LOCALAPPDATA%` on Windows).

use std::path::PathBuf;

use crate::consts::{APP_NAME, BUILD_PREFIX_ENV, CACHE_DIR_ENV};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the root of the provider cache.
pub fn cache_dir() -> PathBuf {
  if let Ok(path) = std::env::var(CACHE_DIR_ENV) {
    return PathBuf::from(path);
  }
  default_cache_dir()
}

#[cfg(windows)]
fn default_cache_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Local"))
    .join(APP_NAME)
    .join("Cache")
}

#[cfg(not(windows))]
fn default_cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the directory under which build actions write their outputs.
pub fn build_prefix() -> PathBuf {
  if let Ok(path) = std::env::var(BUILD_PREFIX_ENV) {
    return PathBuf::from(path);
  }
  cache_dir().join("build")
}

/// Returns the directory holding persisted provider records.
pub fn providers_dir() -> PathBuf {
  cache_dir().join("providers")
}
