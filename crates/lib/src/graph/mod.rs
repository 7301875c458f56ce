//! Requirement graph construction.
//!
//! [`Workspace::load`] turns a [`Manifest`] into a [`RequirementGraph`]:
//! one node per target of every active package, one edge per dependency that
//! survives host filtering. Edges point from dependency to dependent and carry
//! the dependency's [`Visibility`]. No I/O happens here.

mod types;

pub use types::*;

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::{debug, info, trace};

use crate::compose::{ConfigurationIndex, Composition, RequirementKind, compose_with};
use crate::error::{ReferenceKind, ResolveError};
use crate::host::{HostContext, HostMatcher};
use crate::ident::{Identifier, TargetKey, TargetRef};
use crate::manifest::{ConfigEntry, Manifest, PackageDecl, Visibility};

/// Directed graph of targets.
#[derive(Debug, Default)]
pub struct RequirementGraph {
  graph: DiGraph<TargetNode, Edge>,
  nodes: HashMap<TargetKey, NodeIndex>,
  capabilities: HashMap<Identifier, TargetKey>,
}

impl RequirementGraph {
  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }

  /// All targets in insertion order (activation order, then declaration order).
  pub fn targets(&self) -> impl Iterator<Item = &TargetNode> {
    self.graph.node_indices().map(|idx| &self.graph[idx])
  }

  pub fn target(&self, key: &TargetKey) -> Option<&TargetNode> {
    self.nodes.get(key).map(|&idx| &self.graph[idx])
  }

  /// The target providing `capability`, if any active package provides it.
  pub fn provider_of(&self, capability: &Identifier) -> Option<&TargetKey> {
    self.capabilities.get(capability)
  }

  pub(crate) fn index_of(&self, key: &TargetKey) -> Option<NodeIndex> {
    self.nodes.get(key).copied()
  }

  pub(crate) fn node(&self, idx: NodeIndex) -> &TargetNode {
    &self.graph[idx]
  }

  /// Direct dependencies of `idx` in declaration order.
  pub(crate) fn dependency_indices(&self, idx: NodeIndex) -> Vec<(NodeIndex, &Edge)> {
    let mut edges: Vec<_> = self.graph.edges_directed(idx, Direction::Incoming).collect();
    edges.sort_by_key(|e| e.id());
    edges.into_iter().map(|e| (e.source(), e.weight())).collect()
  }

  /// Direct dependents of `idx`.
  pub(crate) fn dependent_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut dependents: Vec<_> = self.graph.neighbors_directed(idx, Direction::Outgoing).collect();
    dependents.sort();
    dependents.dedup();
    dependents
  }

  /// Direct dependencies of `key` with their edges, in declaration order.
  pub fn dependencies(&self, key: &TargetKey) -> Vec<(&TargetKey, &Edge)> {
    let Some(&idx) = self.nodes.get(key) else {
      return Vec::new();
    };
    self
      .dependency_indices(idx)
      .into_iter()
      .map(|(dep, edge)| (&self.graph[dep].key, edge))
      .collect()
  }

  /// Targets that directly depend on `key`.
  pub fn dependents(&self, key: &TargetKey) -> Vec<&TargetKey> {
    let Some(&idx) = self.nodes.get(key) else {
      return Vec::new();
    };
    self
      .dependent_indices(idx)
      .into_iter()
      .map(|dep| &self.graph[dep].key)
      .collect()
  }

  /// Resolve a user-supplied reference: a capability, a `package:name`
  /// qualified target, or a bare target name that is unique across packages.
  pub fn lookup(&self, reference: &str) -> Result<TargetKey, ResolveError> {
    let target_ref: TargetRef = reference.parse()?;
    let unresolved = || ResolveError::UnresolvedReference {
      kind: ReferenceKind::Target,
      name: reference.to_string(),
      context: "request".to_string(),
    };

    if let Some(package) = target_ref.package {
      let key = TargetKey::new(package, target_ref.name);
      return if self.nodes.contains_key(&key) { Ok(key) } else { Err(unresolved()) };
    }

    if let Some(key) = self.capabilities.get(&target_ref.name) {
      return Ok(key.clone());
    }

    let candidates = self.named(&target_ref.name);
    match candidates.as_slice() {
      [] => Err(unresolved()),
      [only] => Ok((*only).clone()),
      many => Err(ResolveError::AmbiguousReference {
        name: reference.to_string(),
        candidates: many.iter().map(|k| k.to_string()).collect(),
      }),
    }
  }

  /// Targets whose name is `name`, in insertion order.
  fn named(&self, name: &Identifier) -> Vec<&TargetKey> {
    self.targets().map(|t| &t.key).filter(|k| &k.name == name).collect()
  }

  /// Resolve a dependency reference written inside `package`.
  fn resolve_reference(
    &self,
    manifest: &Manifest,
    package: &Identifier,
    reference: &Identifier,
  ) -> Result<Option<ResolvedDependency>, ResolveError> {
    if let Some(key) = self.capabilities.get(reference) {
      return Ok(Some(ResolvedDependency::Target(key.clone())));
    }

    let local = TargetKey::new(package.clone(), reference.clone());
    if self.nodes.contains_key(&local) {
      return Ok(Some(ResolvedDependency::Target(local)));
    }

    match self.named(reference).as_slice() {
      [] => {}
      [only] => return Ok(Some(ResolvedDependency::Target((*only).clone()))),
      many => {
        return Err(ResolveError::AmbiguousReference {
          name: reference.to_string(),
          candidates: many.iter().map(|k| k.to_string()).collect(),
        });
      }
    }

    if manifest.is_external(reference) {
      return Ok(Some(ResolvedDependency::External));
    }
    Ok(None)
  }
}

/// A manifest resolved for one host and root configuration.
#[derive(Debug)]
pub struct Workspace {
  manifest: Manifest,
  host: HostContext,
  composition: Option<Composition>,
  active: Vec<Identifier>,
  graph: RequirementGraph,
}

impl Workspace {
  /// Validate `manifest`, compose `root_configuration` (when given) to select
  /// the active packages, and build the requirement graph for `host`.
  ///
  /// Without a root configuration every package is active.
  pub fn load(
    manifest: Manifest,
    root_configuration: Option<&Identifier>,
    host: &HostContext,
  ) -> Result<Self, ResolveError> {
    validate_unique(&manifest)?;
    let index = ConfigurationIndex::new(&manifest)?;

    let mut matcher = HostMatcher::new(host.clone());
    compile_predicates(&manifest, &mut matcher)?;

    let composition = root_configuration
      .map(|name| compose_with(&index, &mut matcher, name))
      .transpose()?;

    let active = match (root_configuration, &composition) {
      (Some(root), Some(composition)) => activate(&manifest, &index, root, composition)?,
      _ => manifest.packages.iter().map(|p| p.name.clone()).collect(),
    };

    let graph = build_graph(&manifest, &active, &mut matcher)?;

    info!(
      host = %host,
      packages = active.len(),
      targets = graph.len(),
      edges = graph.edge_count(),
      "requirement graph built"
    );

    Ok(Self {
      manifest,
      host: host.clone(),
      composition,
      active,
      graph,
    })
  }

  pub fn manifest(&self) -> &Manifest {
    &self.manifest
  }

  pub fn host(&self) -> &HostContext {
    &self.host
  }

  pub fn composition(&self) -> Option<&Composition> {
    self.composition.as_ref()
  }

  /// Active packages in activation order.
  pub fn active_packages(&self) -> &[Identifier] {
    &self.active
  }

  pub fn graph(&self) -> &RequirementGraph {
    &self.graph
  }

  pub fn package(&self, name: &Identifier) -> Option<&PackageDecl> {
    self.manifest.package(name)
  }
}

fn validate_unique(manifest: &Manifest) -> Result<(), ResolveError> {
  let mut packages = HashSet::new();
  for package in &manifest.packages {
    if !packages.insert(&package.name) {
      return Err(ResolveError::DuplicateDefinition {
        kind: ReferenceKind::Package,
        name: package.name.to_string(),
      });
    }

    let mut targets = HashSet::new();
    let mut capabilities = HashSet::new();
    for target in &package.targets {
      if !targets.insert(&target.name) {
        return Err(ResolveError::DuplicateDefinition {
          kind: ReferenceKind::Target,
          name: format!("{}:{}", package.name, target.name),
        });
      }
      if let Some(provider) = &target.provides
        && !capabilities.insert(&provider.capability)
      {
        return Err(ResolveError::DuplicateDefinition {
          kind: ReferenceKind::Capability,
          name: provider.capability.to_string(),
        });
      }
    }
  }
  Ok(())
}

/// Compile every host predicate in the manifest, active or not.
fn compile_predicates(manifest: &Manifest, matcher: &mut HostMatcher) -> Result<(), ResolveError> {
  for package in &manifest.packages {
    for target in &package.targets {
      for dep in &target.depends {
        if let Some(pattern) = &dep.host {
          matcher.matches(pattern)?;
        }
      }
    }
    for config in &package.configurations {
      for entry in &config.entries {
        if let ConfigEntry::Host(block) = entry {
          matcher.matches(&block.host)?;
        }
      }
    }
  }
  Ok(())
}

/// Packages selected by a composition: the root's owner, then each requirement
/// in order (a configuration contributes its owning package).
fn activate(
  manifest: &Manifest,
  index: &ConfigurationIndex<'_>,
  root: &Identifier,
  composition: &Composition,
) -> Result<Vec<Identifier>, ResolveError> {
  let mut active = Vec::new();
  let mut seen = HashSet::new();
  let mut push = |name: &Identifier| {
    if seen.insert(name.clone()) {
      active.push(name.clone());
    }
  };

  if let Some(owner) = index.owner(root) {
    push(&owner.name);
  }

  for requirement in &composition.requirements {
    match requirement.kind {
      RequirementKind::Configuration => {
        if let Some(owner) = index.owner(&requirement.name) {
          push(&owner.name);
        }
      }
      RequirementKind::Package => {
        if manifest.package(&requirement.name).is_none() {
          return Err(ResolveError::UnresolvedReference {
            kind: ReferenceKind::Package,
            name: requirement.name.to_string(),
            context: format!("configuration '{}'", root),
          });
        }
        push(&requirement.name);
      }
    }
  }

  Ok(active)
}

fn build_graph(
  manifest: &Manifest,
  active: &[Identifier],
  matcher: &mut HostMatcher,
) -> Result<RequirementGraph, ResolveError> {
  let packages: Vec<&PackageDecl> = active.iter().filter_map(|name| manifest.package(name)).collect();
  let mut rg = RequirementGraph::default();

  for package in &packages {
    for target in &package.targets {
      let key = TargetKey::new(package.name.clone(), target.name.clone());

      if let Some(provider) = &target.provides {
        match rg.capabilities.get(&provider.capability) {
          Some(existing) => debug!(
            capability = %provider.capability,
            provider = %existing,
            shadowed = %key,
            "capability already provided by an earlier package"
          ),
          None => {
            rg.capabilities.insert(provider.capability.clone(), key.clone());
          }
        }
      }

      let idx = rg.graph.add_node(TargetNode {
        key: key.clone(),
        package_path: package.path.clone(),
        provides: target.provides.clone(),
        dependencies: Vec::new(),
      });
      rg.nodes.insert(key, idx);
    }
  }

  for package in &packages {
    for target in &package.targets {
      let key = TargetKey::new(package.name.clone(), target.name.clone());
      let dependent = rg.nodes[&key];
      let mut dependencies = Vec::with_capacity(target.depends.len());

      for dep in &target.depends {
        if let Some(pattern) = &dep.host
          && !matcher.matches(pattern)?
        {
          trace!(target = %key, reference = %dep.reference, host = %pattern, "dependency skipped for host");
          continue;
        }

        let resolved = rg
          .resolve_reference(manifest, &package.name, &dep.reference)?
          .ok_or_else(|| ResolveError::UnresolvedReference {
            kind: ReferenceKind::Target,
            name: dep.reference.to_string(),
            context: format!("target '{}'", key),
          })?;

        let visibility = dep.visibility();
        if let ResolvedDependency::Target(dep_key) = &resolved {
          let source = rg.nodes[dep_key];
          match rg.graph.find_edge(source, dependent) {
            // The same target named twice: the strongest visibility wins.
            Some(edge) => {
              if visibility.is_public() {
                rg.graph[edge].visibility = Visibility::Public;
              }
            }
            None => {
              rg.graph.add_edge(
                source,
                dependent,
                Edge {
                  visibility,
                  reference: dep.reference.clone(),
                },
              );
            }
          }
        }

        dependencies.push(NodeDependency {
          reference: dep.reference.clone(),
          visibility,
          resolved,
        });
      }

      rg.graph[dependent].dependencies = dependencies;
    }
  }

  Ok(rg)
}
