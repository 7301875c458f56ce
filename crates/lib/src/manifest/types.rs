//! Declaration types for build manifests.
//!
//! A manifest is pure data: packages own targets and configurations, targets
//! declare dependencies and at most one provider, configurations bundle
//! `import`/`require` directives with optional host-scoped blocks.
//!
//! # JSON shape
//!
//! ```json
//! {
//!   "required_version": "1",
//!   "externals": ["Language/C++14"],
//!   "packages": [{
//!     "name": "vizor-platform",
//!     "path": ".",
//!     "targets": [{
//!       "name": "vizor-platform-library",
//!       "depends": ["Language/C++14", { "reference": "Library/Vizor", "public": true }],
//!       "provides": {
//!         "capability": "Library/Vizor/Platform",
//!         "action": { "kind": "build_library", "name": "VizorPlatform",
//!                     "sources": { "root": "source", "patterns": ["Vizor/Platform/**/*.{cpp}"] } },
//!         "exports": { "link_artifact": true, "header_search_paths": ["source"] }
//!       }
//!     }],
//!     "configurations": [{
//!       "name": "vizor-platform", "public": true,
//!       "entries": [{ "require": "vizor" }, { "host": "darwin", "directives": [{ "require": "display-cocoa" }] }]
//!     }]
//!   }]
//! }
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ident::Identifier;

/// The complete, already-parsed declaration set.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  /// Manifest format version, checked by the loader.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub required_version: Option<String>,

  /// Capabilities satisfied outside the graph (languages, host tools).
  #[serde(default)]
  pub externals: Vec<Identifier>,

  /// Packages in declaration order.
  #[serde(default)]
  pub packages: Vec<PackageDecl>,
}

impl Manifest {
  /// Look up a package by name.
  pub fn package(&self, name: &Identifier) -> Option<&PackageDecl> {
    self.packages.iter().find(|p| &p.name == name)
  }

  /// All configurations with their owning package, in declaration order.
  pub fn configurations(&self) -> impl Iterator<Item = (&PackageDecl, &ConfigurationDecl)> {
    self
      .packages
      .iter()
      .flat_map(|p| p.configurations.iter().map(move |c| (p, c)))
  }

  pub fn is_external(&self, reference: &Identifier) -> bool {
    self.externals.contains(reference)
  }
}

fn default_path() -> PathBuf {
  PathBuf::from(".")
}

/// A filesystem-rooted collection of targets and configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDecl {
  pub name: Identifier,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,

  /// Where the package comes from (e.g. a repository URL). Informational.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,

  /// Root directory; relative paths are resolved against the manifest file.
  #[serde(default = "default_path")]
  pub path: PathBuf,

  #[serde(default)]
  pub targets: Vec<TargetDecl>,

  #[serde(default)]
  pub configurations: Vec<ConfigurationDecl>,
}

/// A named build unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDecl {
  pub name: Identifier,

  /// Dependency edges in declaration order.
  #[serde(default)]
  pub depends: Vec<DependencyDecl>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub provides: Option<ProviderDecl>,
}

/// Whether a dependency's metadata is forwarded to the dependent's consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
  Public,
  Private,
}

impl Visibility {
  pub fn is_public(self) -> bool {
    matches!(self, Visibility::Public)
  }
}

impl fmt::Display for Visibility {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Visibility::Public => f.write_str("public"),
      Visibility::Private => f.write_str("private"),
    }
  }
}

/// A dependency edge as declared.
///
/// Deserializes from either a bare string (private, unconditional) or an
/// object with `reference`, `public` and `host` fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "DependencyRepr")]
pub struct DependencyDecl {
  pub reference: Identifier,
  #[serde(default)]
  pub public: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub host: Option<String>,
}

impl DependencyDecl {
  pub fn new(reference: Identifier) -> Self {
    Self {
      reference,
      public: false,
      host: None,
    }
  }

  pub fn public(mut self) -> Self {
    self.public = true;
    self
  }

  pub fn on_host(mut self, pattern: &str) -> Self {
    self.host = Some(pattern.to_string());
    self
  }

  pub fn visibility(&self) -> Visibility {
    if self.public { Visibility::Public } else { Visibility::Private }
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyRepr {
  Bare(Identifier),
  Full {
    reference: Identifier,
    #[serde(default)]
    public: bool,
    #[serde(default)]
    host: Option<String>,
  },
}

impl From<DependencyRepr> for DependencyDecl {
  fn from(repr: DependencyRepr) -> Self {
    match repr {
      DependencyRepr::Bare(reference) => DependencyDecl::new(reference),
      DependencyRepr::Full {
        reference,
        public,
        host,
      } => DependencyDecl {
        reference,
        public,
        host,
      },
    }
  }
}

/// The capability a target exposes plus the action that produces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderDecl {
  pub capability: Identifier,
  pub action: Action,
  #[serde(default)]
  pub exports: ExportDecl,
}

/// A source-file set: glob patterns rooted at a package-relative directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSet {
  #[serde(default = "default_root")]
  pub root: String,
  #[serde(default)]
  pub patterns: Vec<String>,
}

fn default_root() -> String {
  ".".to_string()
}

impl SourceSet {
  pub fn new(root: &str, patterns: &[&str]) -> Self {
    Self {
      root: root.to_string(),
      patterns: patterns.iter().map(|p| p.to_string()).collect(),
    }
  }
}

impl Default for SourceSet {
  fn default() -> Self {
    Self {
      root: default_root(),
      patterns: Vec::new(),
    }
  }
}

/// The build action behind a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
  BuildLibrary {
    name: String,
    #[serde(default)]
    sources: SourceSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
  },
  BuildExecutable {
    name: String,
    #[serde(default)]
    sources: SourceSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
  },
  RunTests {
    name: String,
    #[serde(default)]
    sources: SourceSet,
    #[serde(default)]
    arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
  },
  ConvertAssets {
    name: String,
    #[serde(default)]
    sources: SourceSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
  },
}

impl Action {
  pub fn name(&self) -> &str {
    match self {
      Action::BuildLibrary { name, .. }
      | Action::BuildExecutable { name, .. }
      | Action::RunTests { name, .. }
      | Action::ConvertAssets { name, .. } => name,
    }
  }

  pub fn sources(&self) -> &SourceSet {
    match self {
      Action::BuildLibrary { sources, .. }
      | Action::BuildExecutable { sources, .. }
      | Action::RunTests { sources, .. }
      | Action::ConvertAssets { sources, .. } => sources,
    }
  }

  pub fn command(&self) -> Option<&str> {
    match self {
      Action::BuildLibrary { command, .. }
      | Action::BuildExecutable { command, .. }
      | Action::RunTests { command, .. }
      | Action::ConvertAssets { command, .. } => command.as_deref(),
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Action::BuildLibrary { .. } => "build_library",
      Action::BuildExecutable { .. } => "build_executable",
      Action::RunTests { .. } => "run_tests",
      Action::ConvertAssets { .. } => "convert_assets",
    }
  }

  /// Conventional artifact file name inside the action's output directory.
  pub fn artifact_file_name(&self) -> String {
    match self {
      Action::BuildLibrary { name, .. } => format!("lib{}.a", name),
      Action::BuildExecutable { name, .. } => name.clone(),
      Action::RunTests { name, .. } => format!("{}.test-log", name),
      Action::ConvertAssets { name, .. } => name.clone(),
    }
  }
}

/// What a provider appends to the metadata it propagates.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportDecl {
  /// Append the produced artifact path to the link flags.
  #[serde(default)]
  pub link_artifact: bool,
  #[serde(default)]
  pub link_flags: Vec<String>,
  /// Package-relative header search paths.
  #[serde(default)]
  pub header_search_paths: Vec<String>,
  /// Package-relative asset search paths.
  #[serde(default)]
  pub asset_search_paths: Vec<String>,
}

/// A named, composable bundle of requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationDecl {
  pub name: Identifier,

  /// Marks every directive public unless a directive overrides it.
  #[serde(default)]
  pub public: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,

  /// Directives and host blocks in declaration order.
  #[serde(default)]
  pub entries: Vec<ConfigEntry>,
}

/// One entry of a configuration body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigEntry {
  Host(HostBlock),
  Directive(Directive),
}

/// Directives that apply only when the host matches `host`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostBlock {
  /// Regular expression matched against the host identifier.
  pub host: String,
  #[serde(default)]
  pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveOp {
  /// Inline the whole named configuration.
  Import,
  /// Require a configuration's public closure, or a package.
  Require,
}

/// An `import` or `require` of a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DirectiveRepr", into = "DirectiveRepr")]
pub struct Directive {
  pub op: DirectiveOp,
  pub name: Identifier,
  /// Overrides the owning configuration's visibility for this directive.
  pub public: Option<bool>,
}

impl Directive {
  pub fn import(name: Identifier) -> Self {
    Self {
      op: DirectiveOp::Import,
      name,
      public: None,
    }
  }

  pub fn require(name: Identifier) -> Self {
    Self {
      op: DirectiveOp::Require,
      name,
      public: None,
    }
  }

  pub fn with_public(mut self, public: bool) -> Self {
    self.public = Some(public);
    self
  }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectiveRepr {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  import: Option<Identifier>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  require: Option<Identifier>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  public: Option<bool>,
}

impl TryFrom<DirectiveRepr> for Directive {
  type Error = String;

  fn try_from(repr: DirectiveRepr) -> Result<Self, Self::Error> {
    let (op, name) = match (repr.import, repr.require) {
      (Some(name), None) => (DirectiveOp::Import, name),
      (None, Some(name)) => (DirectiveOp::Require, name),
      (Some(_), Some(_)) => return Err("directive has both 'import' and 'require'".to_string()),
      (None, None) => return Err("directive needs 'import' or 'require'".to_string()),
    };
    Ok(Directive {
      op,
      name,
      public: repr.public,
    })
  }
}

impl From<Directive> for DirectiveRepr {
  fn from(directive: Directive) -> Self {
    let (import, require) = match directive.op {
      DirectiveOp::Import => (Some(directive.name), None),
      DirectiveOp::Require => (None, Some(directive.name)),
    };
    DirectiveRepr {
      import,
      require,
      public: directive.public,
    }
  }
}
