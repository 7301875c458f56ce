//! Configuration composition.
//!
//! Flattens a named configuration into an ordered, de-duplicated list of
//! requirements for a given host.
//!
//! # Expansion rules
//!
//! - The directly requested configuration is expanded in *full* mode: all of
//!   its directives apply.
//! - `import X` inlines X in full mode, at any depth.
//! - `require X` adds X to the result; when X is itself a configuration only
//!   its *public* directives are then expanded, recursively.
//! - A directive is public when it says so, otherwise when its configuration
//!   is marked public.
//! - Host blocks contribute their directives only when their predicate
//!   matches the host.
//!
//! Requirements keep first-seen order because dependents derive link and
//! search-path order from it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ReferenceKind, ResolveError};
use crate::host::{HostContext, HostMatcher};
use crate::ident::Identifier;
use crate::manifest::{ConfigEntry, ConfigurationDecl, Directive, DirectiveOp, Manifest, PackageDecl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
  Configuration,
  Package,
}

/// One entry of a flattened requirement set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
  pub name: Identifier,
  pub kind: RequirementKind,
}

/// The result of composing a configuration for a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
  pub root: Identifier,
  pub host: HostContext,
  pub requirements: Vec<Requirement>,
}

impl Composition {
  /// Requirement names in order.
  pub fn names(&self) -> Vec<&str> {
    self.requirements.iter().map(|r| r.name.as_str()).collect()
  }

  /// Names that refer to packages rather than configurations.
  pub fn packages(&self) -> impl Iterator<Item = &Identifier> {
    self
      .requirements
      .iter()
      .filter(|r| r.kind == RequirementKind::Package)
      .map(|r| &r.name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.requirements.iter().any(|r| r.name.as_str() == name)
  }
}

/// Lookup of configurations by name across all packages.
#[derive(Debug)]
pub struct ConfigurationIndex<'a> {
  by_name: HashMap<&'a Identifier, (&'a PackageDecl, &'a ConfigurationDecl)>,
}

impl<'a> ConfigurationIndex<'a> {
  /// Index every configuration. Names must be unique across the manifest.
  pub fn new(manifest: &'a Manifest) -> Result<Self, ResolveError> {
    let mut by_name = HashMap::new();
    for (package, config) in manifest.configurations() {
      if by_name.insert(&config.name, (package, config)).is_some() {
        return Err(ResolveError::DuplicateDefinition {
          kind: ReferenceKind::Configuration,
          name: config.name.to_string(),
        });
      }
    }
    Ok(Self { by_name })
  }

  pub fn get(&self, name: &Identifier) -> Option<&'a ConfigurationDecl> {
    self.by_name.get(name).map(|(_, config)| *config)
  }

  /// The package that declares the configuration.
  pub fn owner(&self, name: &Identifier) -> Option<&'a PackageDecl> {
    self.by_name.get(name).map(|(package, _)| *package)
  }
}

/// Compose `name` for `host`.
pub fn compose(manifest: &Manifest, name: &Identifier, host: &HostContext) -> Result<Composition, ResolveError> {
  let index = ConfigurationIndex::new(manifest)?;
  let mut matcher = HostMatcher::new(host.clone());
  compose_with(&index, &mut matcher, name)
}

/// Compose `name` using an existing index and host matcher.
pub fn compose_with(
  index: &ConfigurationIndex<'_>,
  matcher: &mut HostMatcher,
  name: &Identifier,
) -> Result<Composition, ResolveError> {
  let root = index.get(name).ok_or_else(|| ResolveError::UnresolvedConfiguration {
    name: name.to_string(),
    from: "request".to_string(),
  })?;

  let mut composer = Composer {
    index,
    matcher,
    expanded: HashSet::new(),
    seen: HashSet::new(),
    requirements: Vec::new(),
  };
  composer.expand(root, Mode::Full)?;

  debug!(
    configuration = %name,
    host = %composer.matcher.host(),
    requirements = composer.requirements.len(),
    "composed configuration"
  );

  Ok(Composition {
    root: name.clone(),
    host: composer.matcher.host().clone(),
    requirements: composer.requirements,
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Mode {
  Full,
  Public,
}

struct Composer<'i, 'a, 'm> {
  index: &'i ConfigurationIndex<'a>,
  matcher: &'m mut HostMatcher,
  /// Configurations already walked, per mode.
  expanded: HashSet<(Identifier, Mode)>,
  seen: HashSet<Identifier>,
  requirements: Vec<Requirement>,
}

impl Composer<'_, '_, '_> {
  fn expand(&mut self, config: &ConfigurationDecl, mode: Mode) -> Result<(), ResolveError> {
    // Full expansion subsumes public expansion.
    if self.expanded.contains(&(config.name.clone(), Mode::Full)) {
      return Ok(());
    }
    if !self.expanded.insert((config.name.clone(), mode)) {
      return Ok(());
    }
    trace!(configuration = %config.name, ?mode, "expanding configuration");

    for entry in &config.entries {
      match entry {
        ConfigEntry::Directive(directive) => self.apply(config, directive, mode)?,
        ConfigEntry::Host(block) => {
          if self.matcher.matches(&block.host)? {
            for directive in &block.directives {
              self.apply(config, directive, mode)?;
            }
          }
        }
      }
    }
    Ok(())
  }

  fn apply(&mut self, owner: &ConfigurationDecl, directive: &Directive, mode: Mode) -> Result<(), ResolveError> {
    let public = directive.public.unwrap_or(owner.public);
    if mode == Mode::Public && !public {
      return Ok(());
    }

    match directive.op {
      DirectiveOp::Import => {
        let imported = self
          .index
          .get(&directive.name)
          .ok_or_else(|| ResolveError::UnresolvedConfiguration {
            name: directive.name.to_string(),
            from: format!("configuration '{}'", owner.name),
          })?;
        self.expand(imported, Mode::Full)
      }
      DirectiveOp::Require => match self.index.get(&directive.name) {
        Some(required) => {
          self.push(&directive.name, RequirementKind::Configuration);
          self.expand(required, Mode::Public)
        }
        None => {
          self.push(&directive.name, RequirementKind::Package);
          Ok(())
        }
      },
    }
  }

  fn push(&mut self, name: &Identifier, kind: RequirementKind) {
    if self.seen.insert(name.clone()) {
      self.requirements.push(Requirement {
        name: name.clone(),
        kind,
      });
    }
  }
}
