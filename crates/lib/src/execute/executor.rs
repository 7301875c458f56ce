//! The toolchain executor seam.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::environment::Environment;
use crate::ident::TargetKey;
use crate::manifest::Action;
use crate::provider::BuildMetadata;

/// Everything a toolchain needs to run one provider action.
#[derive(Debug, Clone)]
pub struct ActionRequest {
  pub target: TargetKey,
  pub action: Action,
  /// Absolute source paths, in globber order.
  pub source_files: Vec<PathBuf>,
  /// Merged exported metadata of every direct dependency.
  pub dependency_metadata: BuildMetadata,
  /// `<build_prefix>/<environment fingerprint>/<package>/<target>`
  pub out_dir: PathBuf,
  pub environment: Environment,
}

/// What a toolchain produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutorOutput {
  pub artifact: Option<PathBuf>,
  /// Metadata the action itself reports, before declared exports.
  pub metadata: BuildMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolchainError {
  pub message: String,
  pub partial_output: Option<String>,
}

impl ToolchainError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      partial_output: None,
    }
  }

  pub fn with_output(mut self, output: impl Into<String>) -> Self {
    let output = output.into();
    if !output.is_empty() {
      self.partial_output = Some(output);
    }
    self
  }
}

/// Compiles, links, runs tests or converts assets.
///
/// Potentially slow and potentially failing; the engine treats it as opaque.
#[async_trait]
pub trait ToolchainExecutor: Send + Sync {
  async fn execute(&self, request: &ActionRequest) -> Result<ExecutorOutput, ToolchainError>;
}
