//! The engine facade: `compose`, `plan`, `resolve` and `build` over one
//! loaded workspace.
//!
//! Graph construction and composition errors abort before any action runs.
//! Toolchain failures stay local to their target and are reported through
//! [`BuildReport`].

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::checksum::{self, Checksum, ChecksumError};
use crate::compose::{self, Composition};
use crate::environment::Environment;
use crate::error::{ReferenceKind, ResolveError};
use crate::execute::{self, BuildConfig, BuildReport, CommandExecutor, ExecuteError, FailedDependency, ToolchainExecutor};
use crate::glob::{FsGlobber, Globber};
use crate::graph::Workspace;
use crate::ident::{Identifier, TargetKey};
use crate::manifest::{Manifest, ManifestError, ManifestSource};
use crate::plan::{self, BuildPlan};
use crate::provider::{CacheError, ProviderRecord, ProviderResolver, ProviderStore, StoreStats};

#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Checksum(#[from] ChecksumError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  /// The requested target itself failed.
  #[error(transparent)]
  Execute(#[from] ExecuteError),

  /// The requested target was never started because a dependency failed.
  #[error("{target} was skipped because {failed} failed")]
  Skipped { target: TargetKey, failed: FailedDependency },
}

/// Outcome of [`Engine::build`].
#[derive(Debug)]
pub struct Build {
  pub plan: BuildPlan,
  pub report: BuildReport,
}

impl Build {
  pub fn is_success(&self) -> bool {
    self.report.is_success()
  }

  /// Records of the requested roots that resolved, in request order.
  pub fn artifacts(&self) -> Vec<&Arc<ProviderRecord>> {
    self.plan.roots.iter().filter_map(|root| self.report.record(root)).collect()
  }
}

pub struct Engine {
  workspace: Workspace,
  environment: Environment,
  globber: Arc<dyn Globber>,
  resolver: Arc<ProviderResolver>,
  config: BuildConfig,
}

/// Configures an [`Engine`] before the workspace is loaded.
pub struct EngineBuilder {
  manifest: Manifest,
  environment: Environment,
  root_configuration: Option<Identifier>,
  executor: Arc<dyn ToolchainExecutor>,
  globber: Arc<dyn Globber>,
  store: Option<ProviderStore>,
  config: BuildConfig,
}

impl EngineBuilder {
  /// Activate only the packages required by this configuration.
  pub fn root_configuration(mut self, name: Identifier) -> Self {
    self.root_configuration = Some(name);
    self
  }

  pub fn executor(mut self, executor: Arc<dyn ToolchainExecutor>) -> Self {
    self.executor = executor;
    self
  }

  pub fn globber(mut self, globber: Arc<dyn Globber>) -> Self {
    self.globber = globber;
    self
  }

  /// Persist provider records in `store`.
  pub fn store(mut self, store: ProviderStore) -> Self {
    self.store = Some(store);
    self
  }

  pub fn config(mut self, config: BuildConfig) -> Self {
    self.config = config;
    self
  }

  /// Validate the manifest and build the requirement graph.
  pub fn load(self) -> Result<Engine, EngineError> {
    let workspace = Workspace::load(self.manifest, self.root_configuration.as_ref(), &self.environment.host)?;

    let mut resolver = ProviderResolver::new(self.executor, self.globber.clone());
    if let Some(store) = self.store {
      resolver = resolver.with_store(store);
    }

    Ok(Engine {
      workspace,
      environment: self.environment,
      globber: self.globber,
      resolver: Arc::new(resolver),
      config: self.config,
    })
  }
}

impl Engine {
  /// Start configuring an engine with the shell executor, the filesystem
  /// globber and no persisted store.
  pub fn builder(manifest: Manifest, environment: Environment) -> EngineBuilder {
    EngineBuilder {
      manifest,
      environment,
      root_configuration: None,
      executor: Arc::new(CommandExecutor::new()),
      globber: Arc::new(FsGlobber),
      store: None,
      config: BuildConfig::default(),
    }
  }

  /// Like [`Engine::builder`], loading the manifest from `source`.
  pub fn open(source: &dyn ManifestSource, environment: Environment) -> Result<EngineBuilder, EngineError> {
    Ok(Self::builder(source.load()?, environment))
  }

  pub fn workspace(&self) -> &Workspace {
    &self.workspace
  }

  pub fn environment(&self) -> &Environment {
    &self.environment
  }

  pub fn resolver(&self) -> &ProviderResolver {
    &self.resolver
  }

  /// What the persisted store holds, if the engine has one.
  pub fn store_stats(&self) -> Result<Option<StoreStats>, EngineError> {
    match self.resolver.store() {
      Some(store) => Ok(Some(store.stats()?)),
      None => Ok(None),
    }
  }

  /// Compose configuration `name` for the engine's host.
  pub fn compose(&self, name: &str) -> Result<Composition, EngineError> {
    let name: Identifier = name.parse().map_err(ResolveError::from)?;
    Ok(compose::compose(
      self.workspace.manifest(),
      &name,
      &self.environment.host,
    )?)
  }

  /// Resolve a user-supplied target reference to its key.
  pub fn target(&self, reference: &str) -> Result<TargetKey, EngineError> {
    Ok(self.workspace.graph().lookup(reference)?)
  }

  /// Plan the transitive closure of `targets`.
  pub fn plan<S: AsRef<str>>(&self, targets: &[S]) -> Result<BuildPlan, EngineError> {
    let roots = targets
      .iter()
      .map(|t| self.target(t.as_ref()))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(plan::plan(self.workspace.graph(), &roots)?)
  }

  /// Cache keys of every planned target for the engine's environment.
  pub fn checksums(&self, plan: &BuildPlan) -> Result<HashMap<TargetKey, Checksum>, EngineError> {
    Ok(checksum::checksum_plan(
      self.workspace.graph(),
      plan,
      self.globber.as_ref(),
      &self.environment,
    )?)
  }

  /// Build everything `targets` need. Node failures are reported in the
  /// result rather than returned as an error.
  pub async fn build<S: AsRef<str>>(&self, targets: &[S]) -> Result<Build, EngineError> {
    let plan = self.plan(targets)?;
    info!(
      roots = plan.roots.len(),
      targets = plan.len(),
      environment = %self.environment.name,
      mode = %self.environment.build_mode,
      "building"
    );
    let report = execute::execute_plan(
      self.workspace.graph(),
      &plan,
      self.resolver.clone(),
      &self.environment,
      &self.config,
    )
    .await;
    Ok(Build { plan, report })
  }

  /// Build `target` and return its provider record.
  pub async fn resolve(&self, target: &str) -> Result<Arc<ProviderRecord>, EngineError> {
    let key = self.target(target)?;
    let Build { mut report, .. } = self.build(&[target]).await?;

    if let Some(record) = report.resolved.remove(&key) {
      return Ok(record);
    }
    if let Some(failed) = report.skipped.remove(&key) {
      return Err(EngineError::Skipped { target: key, failed });
    }
    match report.failed.into_iter().find(|(k, _)| k == &key) {
      Some((_, err)) => Err(err.into()),
      None => Err(
        ResolveError::UnresolvedReference {
          kind: ReferenceKind::Target,
          name: key.to_string(),
          context: "build report".to_string(),
        }
        .into(),
      ),
    }
  }
}
