//! Provider resolution with single-flight caching.
//!
//! Each `(target, environment fingerprint, checksum)` key owns one
//! [`OnceCell`]. Every caller for the same key awaits that cell, so the
//! toolchain runs at most once per key and all callers observe the same
//! record or the same failure. With a persisted store the cell is dropped
//! once resolved and later requests are served from the store.
//!
//! Checksums do not depend on where a package lives, so a stored record
//! keeps only what the toolchain produced. Exported search paths are
//! re-derived from the requesting package's location on every hit.
//! Outputs are written to `<build prefix>/<fingerprint>/<package>/<target>/<checksum>`
//! so a record never points at another checksum's artifact.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::checksum::{self, Checksum};
use crate::environment::Environment;
use crate::execute::{ActionRequest, ExecuteError, ToolchainExecutor};
use crate::glob::Globber;
use crate::graph::TargetNode;
use crate::ident::TargetKey;
use crate::manifest::{ProviderDecl, Visibility};
use crate::util::hash::ObjectHash;

use super::store::ProviderStore;
use super::types::{BuildMetadata, ProviderRecord};

type Resolution = Result<Arc<ProviderRecord>, ExecuteError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
  target: TargetKey,
  environment: ObjectHash,
  checksum: Checksum,
}

/// A resolved dependency as seen by its dependent.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
  pub visibility: Visibility,
  pub record: Arc<ProviderRecord>,
}

pub struct ProviderResolver {
  executor: Arc<dyn ToolchainExecutor>,
  globber: Arc<dyn Globber>,
  store: Option<ProviderStore>,
  inflight: Mutex<HashMap<CacheKey, Arc<OnceCell<Resolution>>>>,
  executions: AtomicUsize,
  cache_hits: AtomicUsize,
}

impl ProviderResolver {
  pub fn new(executor: Arc<dyn ToolchainExecutor>, globber: Arc<dyn Globber>) -> Self {
    Self {
      executor,
      globber,
      store: None,
      inflight: Mutex::new(HashMap::new()),
      executions: AtomicUsize::new(0),
      cache_hits: AtomicUsize::new(0),
    }
  }

  /// Persist records in `store` and consult it before executing.
  pub fn with_store(mut self, store: ProviderStore) -> Self {
    self.store = Some(store);
    self
  }

  pub fn store(&self) -> Option<&ProviderStore> {
    self.store.as_ref()
  }

  /// Toolchain invocations so far.
  pub fn executions(&self) -> usize {
    self.executions.load(Ordering::SeqCst)
  }

  /// Records served from the persisted store so far.
  pub fn cache_hits(&self) -> usize {
    self.cache_hits.load(Ordering::SeqCst)
  }

  /// Resolve `node` given the records of its direct target dependencies.
  ///
  /// `dependencies` must hold one entry per graph edge of `node`, in
  /// declaration order.
  pub async fn resolve(
    &self,
    node: &TargetNode,
    dependencies: &[ResolvedInput],
    environment: &Environment,
  ) -> Result<Arc<ProviderRecord>, ExecuteError> {
    let checksum_error = |message: String| ExecuteError::Checksum {
      target: node.key.clone(),
      message,
    };

    let fingerprint = environment.fingerprint().map_err(|e| checksum_error(e.to_string()))?;

    // Globbing and hashing touch the filesystem; keep them off the runtime.
    let globber = self.globber.clone();
    let scanned = node.clone();
    let (files, sources) = tokio::task::spawn_blocking(move || {
      let files = checksum::source_files(&scanned, globber.as_ref()).map_err(|e| e.to_string())?;
      let sources = checksum::fingerprint_sources(&scanned.package_path, &files).map_err(|e| e.to_string())?;
      Ok::<_, String>((files, sources))
    })
    .await
    .map_err(|e| checksum_error(e.to_string()))?
    .map_err(checksum_error)?;
    let dependency_checksums: HashMap<TargetKey, Checksum> = dependencies
      .iter()
      .map(|d| (d.record.target.clone(), d.record.checksum.clone()))
      .collect();
    let checksum = checksum::compute(node, &sources, &dependency_checksums, &fingerprint).map_err(|e| match e {
      checksum::ChecksumError::MissingDependency { target, dependency } => {
        ExecuteError::MissingDependency { target, dependency }
      }
      other => checksum_error(other.to_string()),
    })?;

    let key = CacheKey {
      target: node.key.clone(),
      environment: fingerprint.clone(),
      checksum: checksum.clone(),
    };
    let cell = {
      let mut inflight = self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
      inflight.entry(key.clone()).or_default().clone()
    };

    let result = cell
      .get_or_init(|| self.produce(node, files, dependencies, environment, &fingerprint, checksum))
      .await
      .clone();

    // Failures are shared with concurrent waiters but not remembered, so a
    // later request retries. Successes stay only when there is no store.
    if result.is_err() || self.store.is_some() {
      let mut inflight = self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
      if inflight.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
        inflight.remove(&key);
      }
    }

    result
  }

  async fn produce(
    &self,
    node: &TargetNode,
    source_files: Vec<PathBuf>,
    dependencies: &[ResolvedInput],
    environment: &Environment,
    fingerprint: &ObjectHash,
    checksum: Checksum,
  ) -> Resolution {
    // Everything a dependency exports reaches this target's action; only
    // public dependencies are forwarded to this target's consumers.
    let mut dependency_metadata = BuildMetadata::default();
    let mut forwarded = BuildMetadata::default();
    for dep in dependencies {
      dependency_metadata.merge(&dep.record.exported);
      if dep.visibility.is_public() {
        forwarded.merge(&dep.record.exported);
      }
    }

    let Some(provider) = &node.provides else {
      debug!(target = %node.key, "target has no provider, forwarding public dependencies");
      return Ok(Arc::new(ProviderRecord {
        target: node.key.clone(),
        capability: None,
        checksum,
        artifact: None,
        output: BuildMetadata::default(),
        own: BuildMetadata::default(),
        exported: forwarded,
      }));
    };

    if let Some(store) = &self.store
      && let Some(cached) = store.lookup(&node.key, fingerprint, &checksum)
    {
      self.cache_hits.fetch_add(1, Ordering::SeqCst);
      info!(target = %node.key, checksum = %truncate(&checksum), "provider cache hit");
      return Ok(Arc::new(assemble(node, provider, checksum, cached.artifact, cached.output, &forwarded)));
    }

    let out_dir = environment
      .build_prefix()
      .join(&fingerprint.0)
      .join(node.key.package.as_str())
      .join(node.key.name.as_str())
      .join(truncate(&checksum));

    let request = ActionRequest {
      target: node.key.clone(),
      action: provider.action.clone(),
      source_files,
      dependency_metadata,
      out_dir,
      environment: environment.clone(),
    };

    self.executions.fetch_add(1, Ordering::SeqCst);
    info!(
      target = %node.key,
      action = provider.action.kind(),
      sources = request.source_files.len(),
      "running toolchain action"
    );

    let output = self
      .executor
      .execute(&request)
      .await
      .map_err(|e| ExecuteError::ToolchainExecutionFailure {
        target: node.key.clone(),
        message: e.message,
        partial_output: e.partial_output,
      })?;

    let record = assemble(node, provider, checksum, output.artifact, output.metadata, &forwarded);

    if let Some(store) = &self.store
      && let Err(e) = store.save(fingerprint, &record)
    {
      warn!(target = %node.key, error = %e, "failed to persist provider record");
    }

    Ok(Arc::new(record))
  }
}

/// Build the record for `node` from what its toolchain produced. Declared
/// exports resolve against the node's package root.
fn assemble(
  node: &TargetNode,
  provider: &ProviderDecl,
  checksum: Checksum,
  artifact: Option<PathBuf>,
  output: BuildMetadata,
  forwarded: &BuildMetadata,
) -> ProviderRecord {
  let mut own = output.clone();
  let exports = &provider.exports;
  if exports.link_artifact
    && let Some(artifact) = &artifact
  {
    own.add_link_flag(artifact.to_string_lossy());
  }
  for flag in &exports.link_flags {
    own.add_link_flag(flag.clone());
  }
  for path in &exports.header_search_paths {
    own.add_header_search_path(node.package_path.join(path).to_string_lossy());
  }
  for path in &exports.asset_search_paths {
    own.add_asset_search_path(node.package_path.join(path).to_string_lossy());
  }

  ProviderRecord {
    target: node.key.clone(),
    capability: Some(provider.capability.clone()),
    checksum,
    artifact,
    output,
    exported: own.clone().merged(forwarded),
    own,
  }
}

fn truncate(checksum: &Checksum) -> &str {
  &checksum.0[..checksum.0.len().min(12)]
}
