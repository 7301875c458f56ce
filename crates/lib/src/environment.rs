//! Explicit per-run build settings.
//!
//! An [`Environment`] is threaded through composition, planning and
//! resolution. Its [`fingerprint`](Environment::fingerprint) partitions the
//! persisted provider cache so that switching host, build mode or relevant
//! variables never reuses or clobbers another environment's entries.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::host::HostContext;
use crate::platform::paths::build_prefix;
use crate::util::hash::{HashError, Hashable, ObjectHash};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
  #[default]
  Debug,
  Release,
}

impl fmt::Display for BuildMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildMode::Debug => f.write_str("debug"),
      BuildMode::Release => f.write_str("release"),
    }
  }
}

impl FromStr for BuildMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "debug" => Ok(BuildMode::Debug),
      "release" => Ok(BuildMode::Release),
      other => Err(format!("unknown build mode '{}' (expected debug or release)", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
  pub name: String,
  pub host: HostContext,
  pub build_mode: BuildMode,
  /// Environment variables that influence the toolchain.
  #[serde(default)]
  pub variables: BTreeMap<String, String>,
  /// Where action outputs are written. Not part of the fingerprint.
  pub build_prefix: PathBuf,
}

/// The fingerprinted subset of an [`Environment`].
#[derive(Serialize)]
struct FingerprintInput<'a> {
  name: &'a str,
  host: &'a HostContext,
  build_mode: BuildMode,
  variables: &'a BTreeMap<String, String>,
}

impl Hashable for FingerprintInput<'_> {}

impl Environment {
  pub fn new(host: HostContext, build_mode: BuildMode, build_prefix: impl Into<PathBuf>) -> Self {
    Self {
      name: "default".to_string(),
      host,
      build_mode,
      variables: BTreeMap::new(),
      build_prefix: build_prefix.into(),
    }
  }

  /// The detected host in debug mode, writing under the default build prefix.
  pub fn detect() -> Self {
    Self::new(HostContext::detect(), BuildMode::default(), build_prefix())
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.variables.insert(key.into(), value.into());
    self
  }

  /// Content hash of everything that affects build outputs.
  pub fn fingerprint(&self) -> Result<ObjectHash, HashError> {
    FingerprintInput {
      name: &self.name,
      host: &self.host,
      build_mode: self.build_mode,
      variables: &self.variables,
    }
    .compute_hash()
  }

  /// Output directory root for this environment: `<build_prefix>/<fingerprint>`.
  pub fn output_root(&self) -> Result<PathBuf, HashError> {
    Ok(self.build_prefix.join(self.fingerprint()?.0))
  }

  pub fn build_prefix(&self) -> &Path {
    &self.build_prefix
  }
}
