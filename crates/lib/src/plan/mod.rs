//! Topological planning over the requirement graph.
//!
//! A plan is the depth-first post-order of the roots' transitive closure.
//! Dependencies are visited in declaration order and roots in the order
//! given, so plans are reproducible across runs. Public and private edges
//! both constrain order.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::debug;

use crate::error::{ReferenceKind, ResolveError};
use crate::graph::RequirementGraph;
use crate::ident::TargetKey;

/// An ordered build plan: every node appears after all of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
  pub roots: Vec<TargetKey>,
  pub order: Vec<TargetKey>,
  /// Longest path from a leaf, per entry of `order`.
  #[serde(skip)]
  depths: Vec<usize>,
}

impl BuildPlan {
  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn contains(&self, key: &TargetKey) -> bool {
    self.order.contains(key)
  }

  pub fn position(&self, key: &TargetKey) -> Option<usize> {
    self.order.iter().position(|k| k == key)
  }

  pub fn iter(&self) -> impl Iterator<Item = &TargetKey> {
    self.order.iter()
  }

  /// Group planned targets by depth, for display.
  ///
  /// Every target in wave `n` depends only on targets in earlier waves.
  pub fn waves(&self) -> Vec<Vec<TargetKey>> {
    let levels = self.depths.iter().copied().max().map_or(0, |max| max + 1);
    let mut waves: Vec<Vec<TargetKey>> = vec![Vec::new(); levels];
    for (key, &depth) in self.order.iter().zip(&self.depths) {
      waves[depth].push(key.clone());
    }
    waves
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
  /// On the current DFS path.
  Visiting,
  Done,
}

/// Plan the transitive closure of `roots`.
pub fn plan(graph: &RequirementGraph, roots: &[TargetKey]) -> Result<BuildPlan, ResolveError> {
  let mut marks: HashMap<NodeIndex, Mark> = HashMap::new();
  let mut depth_of: HashMap<NodeIndex, usize> = HashMap::new();
  let mut order = Vec::new();
  let mut depths = Vec::new();

  for root in roots {
    let start = graph.index_of(root).ok_or_else(|| ResolveError::UnresolvedReference {
      kind: ReferenceKind::Target,
      name: root.to_string(),
      context: "plan".to_string(),
    })?;
    if marks.contains_key(&start) {
      continue;
    }

    // Explicit stack of (node, dependencies, next dependency to visit).
    let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
    marks.insert(start, Mark::Visiting);
    stack.push((start, dependencies(graph, start), 0));

    while let Some((node, deps, next)) = stack.last_mut() {
      if let Some(&dep) = deps.get(*next) {
        *next += 1;
        match marks.get(&dep) {
          Some(Mark::Done) => {}
          Some(Mark::Visiting) => return Err(cycle_error(graph, &stack, dep)),
          None => {
            marks.insert(dep, Mark::Visiting);
            stack.push((dep, dependencies(graph, dep), 0));
          }
        }
        continue;
      }

      let node = *node;
      let depth = deps
        .iter()
        .filter_map(|d| depth_of.get(d))
        .max()
        .map_or(0, |d| d + 1);
      depth_of.insert(node, depth);
      marks.insert(node, Mark::Done);
      order.push(graph.node(node).key.clone());
      depths.push(depth);
      stack.pop();
    }
  }

  debug!(roots = roots.len(), planned = order.len(), "build plan computed");

  Ok(BuildPlan {
    roots: roots.to_vec(),
    order,
    depths,
  })
}

fn dependencies(graph: &RequirementGraph, idx: NodeIndex) -> Vec<NodeIndex> {
  let mut deps: Vec<NodeIndex> = Vec::new();
  for (dep, _) in graph.dependency_indices(idx) {
    if !deps.contains(&dep) {
      deps.push(dep);
    }
  }
  deps
}

/// The cycle closed by reaching `back` while it is still on the stack.
fn cycle_error(graph: &RequirementGraph, stack: &[(NodeIndex, Vec<NodeIndex>, usize)], back: NodeIndex) -> ResolveError {
  let start = stack.iter().position(|(n, _, _)| *n == back).unwrap_or(0);
  let mut path: Vec<String> = stack[start..]
    .iter()
    .map(|(n, _, _)| graph.node(*n).key.to_string())
    .collect();
  path.push(graph.node(back).key.to_string());
  ResolveError::DependencyCycle { path }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::Workspace;
  use crate::host::HostContext;
  use crate::manifest::Manifest;
  use crate::util::testutil::{PackageBuilder, dep, key, manifest, public};
  use proptest::prelude::*;

  fn load(m: Manifest) -> Workspace {
    Workspace::load(m, None, &HostContext::new("linux")).unwrap()
  }

  fn names(plan: &BuildPlan) -> Vec<String> {
    plan.iter().map(|k| k.name.to_string()).collect()
  }

  #[test]
  fn dependencies_come_first_in_declaration_order() {
    let ws = load(manifest(vec![
      PackageBuilder::new("p")
        .target("app", vec![dep("b"), dep("a")])
        .target("a", vec![dep("base")])
        .target("b", vec![dep("base")])
        .target("base", vec![])
        .target("unrelated", vec![])
        .build(),
    ]));

    let plan = plan(ws.graph(), &[key("p", "app")]).unwrap();
    assert_eq!(names(&plan), vec!["base", "b", "a", "app"]);
    assert!(!plan.contains(&key("p", "unrelated")));
  }

  #[test]
  fn shared_roots_are_planned_once() {
    let ws = load(manifest(vec![
      PackageBuilder::new("p")
        .target("a", vec![dep("base")])
        .target("b", vec![dep("base")])
        .target("base", vec![])
        .build(),
    ]));

    let plan = plan(ws.graph(), &[key("p", "a"), key("p", "b"), key("p", "a")]).unwrap();
    assert_eq!(names(&plan), vec!["base", "a", "b"]);
  }

  #[test]
  fn two_node_cycle_reports_full_path() {
    let ws = load(manifest(vec![
      PackageBuilder::new("p")
        .target("a", vec![dep("b")])
        .target("b", vec![dep("a")])
        .build(),
    ]));

    let err = plan(ws.graph(), &[key("p", "a")]).unwrap_err();
    assert_eq!(
      err,
      ResolveError::DependencyCycle {
        path: vec!["p:a".to_string(), "p:b".to_string(), "p:a".to_string()],
      }
    );
  }

  #[test]
  fn cycle_below_root_excludes_prefix() {
    let ws = load(manifest(vec![
      PackageBuilder::new("p")
        .target("root", vec![dep("x")])
        .target("x", vec![dep("y")])
        .target("y", vec![dep("z")])
        .target("z", vec![public("x")])
        .build(),
    ]));

    let err = plan(ws.graph(), &[key("p", "root")]).unwrap_err();
    assert_eq!(err.to_string(), "dependency cycle: p:x -> p:y -> p:z -> p:x");
  }

  #[test]
  fn self_dependency_is_a_cycle() {
    let ws = load(manifest(vec![PackageBuilder::new("p").target("a", vec![dep("a")]).build()]));
    let err = plan(ws.graph(), &[key("p", "a")]).unwrap_err();
    assert!(matches!(err, ResolveError::DependencyCycle { ref path } if path.len() == 2));
  }

  #[test]
  fn unknown_root_is_unresolved() {
    let ws = load(manifest(vec![PackageBuilder::new("p").target("a", vec![]).build()]));
    let err = plan(ws.graph(), &[key("p", "missing")]).unwrap_err();
    assert!(matches!(err, ResolveError::UnresolvedReference { .. }));
  }

  #[test]
  fn waves_group_by_depth() {
    let ws = load(manifest(vec![
      PackageBuilder::new("p")
        .target("app", vec![dep("a"), dep("b")])
        .target("a", vec![dep("base")])
        .target("b", vec![])
        .target("base", vec![])
        .build(),
    ]));

    let plan = plan(ws.graph(), &[key("p", "app")]).unwrap();
    let waves: Vec<Vec<String>> = plan
      .waves()
      .into_iter()
      .map(|w| w.into_iter().map(|k| k.name.to_string()).collect())
      .collect();
    assert_eq!(waves, vec![vec!["base", "b"], vec!["a"], vec!["app"]]);
  }

  /// Random DAGs: target `i` may only depend on targets with a smaller index.
  fn dag_manifest(edges: &[Vec<usize>]) -> Manifest {
    let mut builder = PackageBuilder::new("p");
    for (i, deps) in edges.iter().enumerate() {
      let deps = deps.iter().filter(|&&d| d < i).map(|d| dep(&format!("t{}", d))).collect();
      builder = builder.target(&format!("t{}", i), deps);
    }
    manifest(vec![builder.build()])
  }

  proptest! {
    #[test]
    fn plan_is_a_topological_closure(
      edges in prop::collection::vec(prop::collection::vec(0usize..12, 0..4), 1..12),
      root_seed in 0usize..12,
    ) {
      let ws = load(dag_manifest(&edges));
      let graph = ws.graph();
      let root = key("p", &format!("t{}", root_seed % edges.len()));
      let plan = plan(graph, std::slice::from_ref(&root)).unwrap();

      // Exactly once.
      let mut sorted = plan.order.clone();
      sorted.sort();
      sorted.dedup();
      prop_assert_eq!(sorted.len(), plan.len());

      // Dependencies first, and the closure is complete.
      for (pos, target) in plan.iter().enumerate() {
        for (dep, _) in graph.dependencies(target) {
          let dep_pos = plan.position(dep);
          prop_assert!(dep_pos.is_some());
          prop_assert!(dep_pos.unwrap() < pos);
        }
      }
      prop_assert_eq!(plan.order.last(), Some(&root));
    }
  }
}
