//! Types for plan execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::ident::TargetKey;
use crate::provider::ProviderRecord;

/// Errors local to one node of a build.
///
/// Cloneable so that every caller waiting on the same in-flight resolution
/// receives the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
  /// The toolchain executor failed for this target.
  #[error("toolchain failed for {target}: {message}")]
  ToolchainExecutionFailure {
    target: TargetKey,
    message: String,
    partial_output: Option<String>,
  },

  /// Sources could not be globbed or hashed.
  #[error("failed to compute checksum for {target}: {message}")]
  Checksum { target: TargetKey, message: String },

  /// A dependency's record was not available when this target started.
  #[error("dependency {dependency} of {target} has not been resolved")]
  MissingDependency { target: TargetKey, dependency: TargetKey },

  #[error("io error for {target}: {message}")]
  Io { target: TargetKey, message: String },

  #[error("task for {target} panicked: {message}")]
  TaskPanicked { target: TargetKey, message: String },
}

impl ExecuteError {
  pub fn target(&self) -> &TargetKey {
    match self {
      ExecuteError::ToolchainExecutionFailure { target, .. }
      | ExecuteError::Checksum { target, .. }
      | ExecuteError::MissingDependency { target, .. }
      | ExecuteError::Io { target, .. }
      | ExecuteError::TaskPanicked { target, .. } => target,
    }
  }

  /// Output captured before the failure, if any.
  pub fn partial_output(&self) -> Option<&str> {
    match self {
      ExecuteError::ToolchainExecutionFailure { partial_output, .. } => partial_output.as_deref(),
      _ => None,
    }
  }
}

/// Identifies the failed dependency that caused a target to be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDependency(pub TargetKey);

impl std::fmt::Display for FailedDependency {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Result of executing a build plan.
#[derive(Debug, Default)]
pub struct BuildReport {
  /// Records of targets that resolved, by target.
  pub resolved: HashMap<TargetKey, Arc<ProviderRecord>>,

  /// Targets whose resolution failed.
  pub failed: Vec<(TargetKey, ExecuteError)>,

  /// Targets never started because a dependency failed.
  pub skipped: HashMap<TargetKey, FailedDependency>,

  /// Toolchain invocations made during this run.
  pub executed: usize,

  /// Records served from the persisted store.
  pub cache_hits: usize,

  pub elapsed: Duration,
}

impl BuildReport {
  /// True if every planned target resolved.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  pub fn total(&self) -> usize {
    self.resolved.len() + self.failed.len() + self.skipped.len()
  }

  pub fn record(&self, target: &TargetKey) -> Option<&Arc<ProviderRecord>> {
    self.resolved.get(target)
  }
}

/// Configuration for plan execution.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Maximum number of targets resolved in parallel.
  pub parallelism: usize,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
    }
  }
}

impl BuildConfig {
  pub fn with_parallelism(parallelism: usize) -> Self {
    Self {
      parallelism: parallelism.max(1),
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
