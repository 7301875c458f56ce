//! Parallel execution of a build plan.
//!
//! The scheduler walks the plan as a DAG. A target becomes eligible once every
//! one of its planned dependencies has resolved, runs inside a [`JoinSet`]
//! bounded by a [`Semaphore`], and publishes its record to its dependents
//! only after it finishes. A failed target skips its transitive dependents;
//! independent branches keep running.

pub mod cmd;
mod executor;
pub mod types;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::environment::Environment;
use crate::graph::{RequirementGraph, TargetNode};
use crate::ident::TargetKey;
use crate::manifest::Visibility;
use crate::plan::BuildPlan;
use crate::provider::{ProviderRecord, ProviderResolver, ResolvedInput};

pub use cmd::CommandExecutor;
pub use executor::{ActionRequest, ExecutorOutput, ToolchainError, ToolchainExecutor};
pub use types::{BuildConfig, BuildReport, ExecuteError, FailedDependency};

/// Scheduling state of one planned target.
struct PlannedTarget {
  node: TargetNode,
  /// Direct dependencies in declaration order, one per graph edge.
  dependencies: Vec<(TargetKey, Visibility)>,
  dependents: Vec<TargetKey>,
  /// Dependencies not yet resolved.
  pending: usize,
}

/// Resolve every target of `plan`.
///
/// Node failures never abort the run; they are collected in the returned
/// [`BuildReport`] together with the targets they caused to be skipped.
pub async fn execute_plan(
  graph: &RequirementGraph,
  plan: &BuildPlan,
  resolver: Arc<ProviderResolver>,
  environment: &Environment,
  config: &BuildConfig,
) -> BuildReport {
  let started = Instant::now();
  let executions_before = resolver.executions();
  let hits_before = resolver.cache_hits();

  info!(targets = plan.len(), parallelism = config.parallelism, "starting plan execution");

  let mut targets = schedule(graph, plan);
  let mut report = BuildReport::default();
  let environment = Arc::new(environment.clone());
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut join_set = JoinSet::new();
  let mut running: HashMap<tokio::task::Id, TargetKey> = HashMap::new();

  let mut ready: VecDeque<TargetKey> = plan
    .iter()
    .filter(|key| targets.get(*key).is_some_and(|t| t.pending == 0))
    .cloned()
    .collect();

  loop {
    while let Some(key) = ready.pop_front() {
      let Some(target) = targets.get(&key) else {
        continue;
      };
      let inputs = match inputs_for(target, &report) {
        Ok(inputs) => inputs,
        Err(err) => {
          fail(&mut report, &targets, key, err);
          continue;
        }
      };

      debug!(target = %key, "target ready");
      let node = target.node.clone();
      let resolver = resolver.clone();
      let environment = environment.clone();
      let semaphore = semaphore.clone();
      let handle = join_set.spawn(async move {
        let _permit = semaphore.acquire_owned().await.ok();
        let result = resolver.resolve(&node, &inputs, &environment).await;
        (node.key, result)
      });
      running.insert(handle.id(), key);
    }

    let Some(joined) = join_set.join_next_with_id().await else {
      break;
    };

    let (key, result) = match joined {
      Ok((id, (key, result))) => {
        running.remove(&id);
        (key, result)
      }
      Err(join_error) => {
        let Some(key) = running.remove(&join_error.id()) else {
          error!(error = %join_error, "untracked build task failed");
          continue;
        };
        let err = ExecuteError::TaskPanicked {
          target: key.clone(),
          message: join_error.to_string(),
        };
        (key, Err(err))
      }
    };

    match result {
      Ok(record) => {
        info!(target = %key, artifact = ?record.artifact, "target resolved");
        publish(&mut targets, &key, &mut ready);
        report.resolved.insert(key, record);
      }
      Err(err) => fail(&mut report, &targets, key, err),
    }
  }

  report.executed = resolver.executions() - executions_before;
  report.cache_hits = resolver.cache_hits() - hits_before;
  report.elapsed = started.elapsed();

  info!(
    resolved = report.resolved.len(),
    failed = report.failed.len(),
    skipped = report.skipped.len(),
    executed = report.executed,
    cache_hits = report.cache_hits,
    elapsed = ?report.elapsed,
    "plan execution complete"
  );

  report
}

/// Build the scheduling table for every planned target.
fn schedule(graph: &RequirementGraph, plan: &BuildPlan) -> HashMap<TargetKey, PlannedTarget> {
  let mut targets = HashMap::with_capacity(plan.len());

  for key in plan.iter() {
    let Some(node) = graph.target(key) else {
      continue;
    };
    let dependencies: Vec<(TargetKey, Visibility)> = graph
      .dependencies(key)
      .into_iter()
      .map(|(dep, edge)| (dep.clone(), edge.visibility))
      .collect();
    let pending = dependencies
      .iter()
      .map(|(dep, _)| dep)
      .collect::<HashSet<_>>()
      .len();
    let dependents = graph
      .dependents(key)
      .into_iter()
      .filter(|d| plan.contains(d))
      .cloned()
      .collect();

    targets.insert(
      key.clone(),
      PlannedTarget {
        node: node.clone(),
        dependencies,
        dependents,
        pending,
      },
    );
  }

  targets
}

fn inputs_for(target: &PlannedTarget, report: &BuildReport) -> Result<Vec<ResolvedInput>, ExecuteError> {
  target
    .dependencies
    .iter()
    .map(|(dep, visibility)| {
      let record: &Arc<ProviderRecord> = report.resolved.get(dep).ok_or_else(|| ExecuteError::MissingDependency {
        target: target.node.key.clone(),
        dependency: dep.clone(),
      })?;
      Ok(ResolvedInput {
        visibility: *visibility,
        record: record.clone(),
      })
    })
    .collect()
}

/// Release the dependents of a resolved target.
fn publish(targets: &mut HashMap<TargetKey, PlannedTarget>, key: &TargetKey, ready: &mut VecDeque<TargetKey>) {
  let dependents = targets.get(key).map(|t| t.dependents.clone()).unwrap_or_default();
  for dependent in dependents {
    if let Some(target) = targets.get_mut(&dependent) {
      target.pending = target.pending.saturating_sub(1);
      if target.pending == 0 {
        ready.push_back(dependent);
      }
    }
  }
}

/// Record a failure and skip everything downstream of it.
fn fail(report: &mut BuildReport, targets: &HashMap<TargetKey, PlannedTarget>, key: TargetKey, err: ExecuteError) {
  error!(target = %key, error = %err, "target failed");

  let mut queue: VecDeque<&TargetKey> = targets.get(&key).map(|t| t.dependents.iter().collect()).unwrap_or_default();
  while let Some(dependent) = queue.pop_front() {
    if report.skipped.contains_key(dependent) {
      continue;
    }
    warn!(target = %dependent, failed_dep = %key, "skipping target due to failed dependency");
    report
      .skipped
      .insert(dependent.clone(), FailedDependency(key.clone()));
    if let Some(target) = targets.get(dependent) {
      queue.extend(target.dependents.iter());
    }
  }

  report.failed.push((key, err));
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::environment::BuildMode;
  use crate::glob::FsGlobber;
  use crate::graph::Workspace;
  use crate::host::HostContext;
  use crate::manifest::{Action, ExportDecl, ProviderDecl, SourceSet};
  use crate::plan::plan;
  use crate::util::testutil::{
    PackageBuilder, RecordingExecutor, dep, failing_command, headers, id, key, manifest, public, vizor_manifest,
    write_output,
  };
  use std::time::Duration;
  use tempfile::TempDir;

  fn env(temp: &TempDir) -> Environment {
    Environment::new(HostContext::new("x86_64-linux"), BuildMode::Debug, temp.path().join("build"))
  }

  async fn run(ws: &Workspace, root: &TargetKey, executor: Arc<dyn ToolchainExecutor>, env: &Environment) -> BuildReport {
    let plan = plan(ws.graph(), std::slice::from_ref(root)).unwrap();
    let resolver = Arc::new(ProviderResolver::new(executor, Arc::new(FsGlobber)));
    execute_plan(ws.graph(), &plan, resolver, env, &BuildConfig::with_parallelism(4)).await
  }

  /// base <- left, right <- top, every target a library in package `p`.
  fn diamond(temp: &TempDir) -> Workspace {
    let m = manifest(vec![
      PackageBuilder::new("p")
        .path(temp.path().join("p"))
        .library("base", "Library/Base", vec![], headers("include"))
        .library("left", "Library/Left", vec![public("Library/Base")], ExportDecl::default())
        .library("right", "Library/Right", vec![dep("Library/Base")], ExportDecl::default())
        .library("top", "Library/Top", vec![dep("Library/Left"), dep("Library/Right")], ExportDecl::default())
        .build(),
    ]);
    Workspace::load(m, None, &HostContext::new("x86_64-linux")).unwrap()
  }

  #[tokio::test]
  async fn diamond_runs_every_target_once_after_its_dependencies() {
    let temp = TempDir::new().unwrap();
    let ws = diamond(&temp);
    let executor = Arc::new(RecordingExecutor::new().with_delay(Duration::from_millis(10)));

    let report = run(&ws, &key("p", "top"), executor.clone(), &env(&temp)).await;

    assert!(report.is_success());
    assert_eq!(report.resolved.len(), 4);
    assert_eq!(report.executed, 4);
    assert_eq!(executor.calls(), 4);

    let order = executor.order();
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert_eq!(pos("base"), 0);
    assert!(pos("left") < pos("top"));
    assert!(pos("right") < pos("top"));

    // `left` forwards `base` publicly, `right` does not.
    let top = executor.request_for("top").unwrap();
    let base_headers = temp.path().join("p").join("include").to_string_lossy().to_string();
    assert!(top.dependency_metadata.header_search_paths.contains(&base_headers));
  }

  #[tokio::test]
  async fn failure_skips_dependents_but_not_independent_branches() {
    let temp = TempDir::new().unwrap();
    let m = manifest(vec![
      PackageBuilder::new("p")
        .path(temp.path().join("p"))
        .library("broken", "Library/Broken", vec![], ExportDecl::default())
        .library("above", "Library/Above", vec![dep("Library/Broken")], ExportDecl::default())
        .library("fine", "Library/Fine", vec![], ExportDecl::default())
        .library(
          "top",
          "Library/Top",
          vec![dep("Library/Above"), dep("Library/Fine")],
          ExportDecl::default(),
        )
        .build(),
    ]);
    let ws = Workspace::load(m, None, &HostContext::new("linux")).unwrap();
    let executor = Arc::new(RecordingExecutor::new().failing(&["broken"]));

    let report = run(&ws, &key("p", "top"), executor.clone(), &env(&temp)).await;

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, key("p", "broken"));
    assert_eq!(report.failed[0].1.partial_output(), Some("error: expected ';'"));
    assert_eq!(report.skipped.get(&key("p", "above")), Some(&FailedDependency(key("p", "broken"))));
    assert_eq!(report.skipped.get(&key("p", "top")), Some(&FailedDependency(key("p", "broken"))));
    assert!(report.resolved.contains_key(&key("p", "fine")));
    assert_eq!(report.total(), 4);

    // Skipped targets never reach the toolchain.
    assert!(executor.request_for("above").is_none());
    assert!(executor.request_for("top").is_none());
  }

  #[tokio::test]
  async fn parallelism_of_one_still_completes() {
    let temp = TempDir::new().unwrap();
    let ws = diamond(&temp);
    let plan = plan(ws.graph(), &[key("p", "top")]).unwrap();
    let resolver = Arc::new(ProviderResolver::new(
      Arc::new(RecordingExecutor::new()),
      Arc::new(FsGlobber),
    ));

    let report = execute_plan(ws.graph(), &plan, resolver, &env(&temp), &BuildConfig::with_parallelism(1)).await;
    assert!(report.is_success());
    assert_eq!(report.resolved.len(), 4);
  }

  #[tokio::test]
  async fn rerun_with_store_hits_cache() {
    let temp = TempDir::new().unwrap();
    let ws = Workspace::load(
      vizor_manifest(&temp.path().join("src")),
      None,
      &HostContext::new("x86_64-linux"),
    )
    .unwrap();
    let env = env(&temp);
    let root = key("vizor-platform", "vizor-platform-app");
    let plan = plan(ws.graph(), std::slice::from_ref(&root)).unwrap();
    let store = crate::provider::ProviderStore::new(temp.path().join("providers"));

    let first = Arc::new(
      ProviderResolver::new(Arc::new(RecordingExecutor::new()), Arc::new(FsGlobber)).with_store(store.clone()),
    );
    let cold = execute_plan(ws.graph(), &plan, first, &env, &BuildConfig::default()).await;
    assert_eq!(cold.executed, 4);
    assert_eq!(cold.cache_hits, 0);

    let executor = Arc::new(RecordingExecutor::new());
    let second = Arc::new(ProviderResolver::new(executor.clone(), Arc::new(FsGlobber)).with_store(store));
    let warm = execute_plan(ws.graph(), &plan, second, &env, &BuildConfig::default()).await;
    assert_eq!(warm.executed, 0);
    assert_eq!(warm.cache_hits, 4);
    assert_eq!(executor.calls(), 0);
    assert_eq!(cold.record(&root), warm.record(&root));
  }

  fn command_action(name: &str, command: String) -> Action {
    Action::BuildLibrary {
      name: name.to_string(),
      sources: SourceSet::default(),
      command: Some(command),
    }
  }

  #[tokio::test]
  async fn command_executor_builds_and_propagates_directives() {
    let temp = TempDir::new().unwrap();
    let m = manifest(vec![
      PackageBuilder::new("p")
        .path(temp.path().join("p"))
        .provider(
          "zlib",
          vec![],
          ProviderDecl {
            capability: id("Library/Zlib"),
            action: command_action(
              "zlib",
              format!("{}; echo 'kettle:link-flag=-lz'", write_output("libzlib.a", "archive")),
            ),
            exports: ExportDecl {
              link_artifact: true,
              ..Default::default()
            },
          },
        )
        .provider(
          "app",
          vec![dep("Library/Zlib")],
          ProviderDecl {
            capability: id("Executable/App"),
            action: command_action("app", write_output("libapp.a", "app")),
            exports: ExportDecl::default(),
          },
        )
        .build(),
    ]);
    let ws = Workspace::load(m, None, &HostContext::new("linux")).unwrap();
    let env = env(&temp);

    let report = run(&ws, &key("p", "app"), Arc::new(CommandExecutor::new()), &env).await;

    assert!(report.is_success(), "{:?}", report.failed);
    let zlib = report.record(&key("p", "zlib")).unwrap();
    let artifact = zlib.artifact.clone().unwrap();
    assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "archive");
    assert!(zlib.exported.link_flags.contains(&"-lz".to_string()));
    assert!(zlib.exported.link_flags.contains(&artifact.to_string_lossy().to_string()));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn command_failure_reports_stderr() {
    let temp = TempDir::new().unwrap();
    let m = manifest(vec![
      PackageBuilder::new("p")
        .path(temp.path().join("p"))
        .provider(
          "bad",
          vec![],
          ProviderDecl {
            capability: id("Library/Bad"),
            action: command_action("bad", failing_command("undefined reference to main")),
            exports: ExportDecl::default(),
          },
        )
        .build(),
    ]);
    let ws = Workspace::load(m, None, &HostContext::new("linux")).unwrap();

    let report = run(&ws, &key("p", "bad"), Arc::new(CommandExecutor::new()), &env(&temp)).await;

    let (target, err) = &report.failed[0];
    assert_eq!(target, &key("p", "bad"));
    assert!(matches!(err, ExecuteError::ToolchainExecutionFailure { .. }));
    assert!(err.partial_output().unwrap().contains("undefined reference to main"));
  }
}
