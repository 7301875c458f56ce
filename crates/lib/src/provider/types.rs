use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::ident::{Identifier, TargetKey};
use crate::util::hash::Hashable;

/// Build metadata propagated from providers to their consumers.
///
/// Every list is ordered and free of duplicates; merging keeps the first
/// occurrence.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildMetadata {
  #[serde(default)]
  pub link_flags: Vec<String>,
  #[serde(default)]
  pub header_search_paths: Vec<String>,
  #[serde(default)]
  pub asset_search_paths: Vec<String>,
}

fn append(list: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
  for item in items {
    if !list.contains(&item) {
      list.push(item);
    }
  }
}

impl BuildMetadata {
  pub fn is_empty(&self) -> bool {
    self.link_flags.is_empty() && self.header_search_paths.is_empty() && self.asset_search_paths.is_empty()
  }

  /// Append `other` after `self`.
  pub fn merge(&mut self, other: &BuildMetadata) {
    append(&mut self.link_flags, other.link_flags.iter().cloned());
    append(&mut self.header_search_paths, other.header_search_paths.iter().cloned());
    append(&mut self.asset_search_paths, other.asset_search_paths.iter().cloned());
  }

  pub fn merged(mut self, other: &BuildMetadata) -> Self {
    self.merge(other);
    self
  }

  pub fn add_link_flag(&mut self, flag: impl Into<String>) {
    append(&mut self.link_flags, [flag.into()]);
  }

  pub fn add_header_search_path(&mut self, path: impl Into<String>) {
    append(&mut self.header_search_paths, [path.into()]);
  }

  pub fn add_asset_search_path(&mut self, path: impl Into<String>) {
    append(&mut self.asset_search_paths, [path.into()]);
  }
}

/// The resolved output of one target's provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
  pub target: TargetKey,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub capability: Option<Identifier>,
  pub checksum: Checksum,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub artifact: Option<PathBuf>,
  /// Metadata reported by the toolchain, before declared exports.
  #[serde(default)]
  pub output: BuildMetadata,
  /// `output` plus the declared exports, resolved against the package root.
  pub own: BuildMetadata,
  /// `own` followed by the exported metadata of public dependencies.
  pub exported: BuildMetadata,
}

impl Hashable for ProviderRecord {}
