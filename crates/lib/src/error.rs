//! Errors raised while turning declarations into a resolved build graph.
//!
//! Every variant here indicates a malformed build description and aborts the
//! run before any toolchain action starts.

use std::fmt;

use thiserror::Error;

use crate::ident::IdentError;

/// What kind of name failed to resolve or was declared twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
  Target,
  Capability,
  Configuration,
  Package,
}

impl fmt::Display for ReferenceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ReferenceKind::Target => "target",
      ReferenceKind::Capability => "capability",
      ReferenceKind::Configuration => "configuration",
      ReferenceKind::Package => "package",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  /// An identifier was not found among known targets, capabilities or packages.
  #[error("unresolved {kind} '{name}' (referenced from {context})")]
  UnresolvedReference {
    kind: ReferenceKind,
    name: String,
    context: String,
  },

  /// An imported or requested configuration does not exist.
  #[error("unresolved configuration '{name}' (referenced from {from})")]
  UnresolvedConfiguration { name: String, from: String },

  /// The requirement graph contains a cycle; `path` starts and ends on the same node.
  #[error("dependency cycle: {}", path.join(" -> "))]
  DependencyCycle { path: Vec<String> },

  /// A host matcher could not be compiled.
  #[error("invalid host predicate '{pattern}': {message}")]
  HostPredicate { pattern: String, message: String },

  /// Two declarations share a name where names must be unique.
  #[error("duplicate {kind} '{name}'")]
  DuplicateDefinition { kind: ReferenceKind, name: String },

  /// A bare target name matches targets in more than one package.
  #[error("ambiguous target '{name}' (candidates: {})", candidates.join(", "))]
  AmbiguousReference { name: String, candidates: Vec<String> },

  #[error("invalid identifier: {0}")]
  InvalidIdentifier(#[from] IdentError),
}
