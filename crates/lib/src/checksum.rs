//! Content-derived cache keys.
//!
//! A target's checksum covers its key, its provider declaration, the content
//! of its source files, its resolved dependencies' checksums and the
//! environment fingerprint. Package roots are stored relative and no
//! timestamps are read, so identical inputs give identical keys on any
//! machine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::environment::Environment;
use crate::glob::{GlobError, Globber};
use crate::graph::{RequirementGraph, ResolvedDependency, TargetNode};
use crate::ident::{Identifier, TargetKey};
use crate::manifest::{ProviderDecl, Visibility};
use crate::plan::BuildPlan;
use crate::util::hash::{ContentHash, FileHashError, HashError, Hashable, ObjectHash, hash_file};

/// Bumped whenever the checksum document layout changes.
const CHECKSUM_FORMAT: u32 = 1;

pub type Checksum = ContentHash;

#[derive(Debug, Error)]
pub enum ChecksumError {
  #[error(transparent)]
  Glob(#[from] GlobError),

  #[error(transparent)]
  Hash(#[from] FileHashError),

  #[error("failed to serialize checksum input: {0}")]
  Serialize(#[from] HashError),

  #[error("dependency {dependency} of {target} has no checksum yet")]
  MissingDependency { target: TargetKey, dependency: TargetKey },
}

/// A source file as it enters the checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
  /// Path relative to the package root, `/`-separated.
  pub path: String,
  pub hash: ContentHash,
}

/// Absolute paths of a target's source files, in globber order.
pub fn source_files(node: &TargetNode, globber: &dyn Globber) -> Result<Vec<PathBuf>, GlobError> {
  let Some(provider) = &node.provides else {
    return Ok(Vec::new());
  };
  let sources = provider.action.sources();
  globber.glob(&node.package_path.join(&sources.root), &sources.patterns)
}

/// Hash each file and express its path relative to `package_root`.
pub fn fingerprint_sources(package_root: &Path, files: &[PathBuf]) -> Result<Vec<SourceFile>, FileHashError> {
  files
    .iter()
    .map(|file| {
      let relative = file.strip_prefix(package_root).unwrap_or(file);
      Ok(SourceFile {
        path: relative
          .components()
          .map(|c| c.as_os_str().to_string_lossy())
          .collect::<Vec<_>>()
          .join("/"),
        hash: hash_file(file)?,
      })
    })
    .collect()
}

#[derive(Serialize)]
struct DependencyInput<'a> {
  reference: &'a Identifier,
  visibility: Visibility,
  checksum: &'a str,
}

#[derive(Serialize)]
struct ChecksumInput<'a> {
  format: u32,
  target: &'a TargetKey,
  provider: Option<&'a ProviderDecl>,
  sources: &'a [SourceFile],
  dependencies: Vec<DependencyInput<'a>>,
  environment: &'a ObjectHash,
}

impl Hashable for ChecksumInput<'_> {}

/// Compute the checksum of `node` from already-fingerprinted sources and the
/// checksums of its target dependencies.
pub fn compute(
  node: &TargetNode,
  sources: &[SourceFile],
  dependency_checksums: &HashMap<TargetKey, Checksum>,
  environment: &ObjectHash,
) -> Result<Checksum, ChecksumError> {
  let mut dependencies = Vec::with_capacity(node.dependencies.len());
  for dep in &node.dependencies {
    let checksum = match &dep.resolved {
      ResolvedDependency::External => "external",
      ResolvedDependency::Target(key) => dependency_checksums
        .get(key)
        .map(|c| c.0.as_str())
        .ok_or_else(|| ChecksumError::MissingDependency {
          target: node.key.clone(),
          dependency: key.clone(),
        })?,
    };
    dependencies.push(DependencyInput {
      reference: &dep.reference,
      visibility: dep.visibility,
      checksum,
    });
  }

  let checksum = ChecksumInput {
    format: CHECKSUM_FORMAT,
    target: &node.key,
    provider: node.provides.as_ref(),
    sources,
    dependencies,
    environment,
  }
  .compute_content_hash()?;

  trace!(target = %node.key, checksum = %checksum, "computed checksum");
  Ok(checksum)
}

/// Checksums of every planned target, computed in plan order.
pub fn checksum_plan(
  graph: &RequirementGraph,
  plan: &BuildPlan,
  globber: &dyn Globber,
  environment: &Environment,
) -> Result<HashMap<TargetKey, Checksum>, ChecksumError> {
  let fingerprint = environment.fingerprint()?;
  let mut checksums = HashMap::with_capacity(plan.len());

  for key in plan.iter() {
    let Some(node) = graph.target(key) else {
      continue;
    };
    let files = source_files(node, globber)?;
    let sources = fingerprint_sources(&node.package_path, &files)?;
    let checksum = compute(node, &sources, &checksums, &fingerprint)?;
    checksums.insert(key.clone(), checksum);
  }

  Ok(checksums)
}
