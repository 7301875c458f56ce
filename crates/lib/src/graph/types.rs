use std::path::PathBuf;

use serde::Serialize;

use crate::ident::{Identifier, TargetKey};
use crate::manifest::{ProviderDecl, Visibility};

/// A target as it appears in the resolved graph.
#[derive(Debug, Clone, Serialize)]
pub struct TargetNode {
  pub key: TargetKey,
  /// Absolute root of the owning package.
  #[serde(skip)]
  pub package_path: PathBuf,
  pub provides: Option<ProviderDecl>,
  /// Dependencies that survived host filtering, in declaration order.
  pub dependencies: Vec<NodeDependency>,
}

/// One declared dependency after reference resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDependency {
  pub reference: Identifier,
  pub visibility: Visibility,
  pub resolved: ResolvedDependency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedDependency {
  /// Another node of the graph.
  Target(TargetKey),
  /// Satisfied outside the graph (a language or host tool).
  External,
}

/// Edge weight, pointing from dependency to dependent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
  pub visibility: Visibility,
  /// The reference as written in the dependent's declaration.
  pub reference: Identifier,
}
