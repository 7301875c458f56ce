//! Implementation of the `kettle build` command.
//!
//! Holds the build lock of its environment for the whole run. Failed targets do not stop
//! independent branches; the command exits non-zero if anything failed or was
//! skipped.

use anyhow::{Context, Result, bail};
use serde::Serialize;

use kettle_lib::platform::paths::cache_dir;
use kettle_lib::build_lock::BuildLock;

use crate::cmd::RunArgs;
use crate::output::{
  OutputFormat, format_duration, print_captured, print_error, print_json, print_stat, print_success, print_warning,
};

#[derive(Serialize)]
struct BuildOutput {
  success: bool,
  resolved: Vec<ResolvedTarget>,
  failed: Vec<FailedTarget>,
  skipped: Vec<SkippedTarget>,
  executed: usize,
  cache_hits: usize,
  elapsed_ms: u128,
}

#[derive(Serialize)]
struct ResolvedTarget {
  target: String,
  checksum: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  artifact: Option<String>,
}

#[derive(Serialize)]
struct FailedTarget {
  target: String,
  error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  output: Option<String>,
}

#[derive(Serialize)]
struct SkippedTarget {
  target: String,
  failed_dependency: String,
}

pub fn cmd_build(args: &RunArgs, targets: &[String], output: OutputFormat) -> Result<()> {
  let engine = args.engine()?;
  let _lock = BuildLock::acquire(&cache_dir(), engine.environment(), targets)?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let build = rt.block_on(engine.build(targets)).context("Build failed")?;
  let report = &build.report;

  if output.is_json() {
    let resolved = build
      .plan
      .iter()
      .filter_map(|key| report.record(key))
      .map(|record| ResolvedTarget {
        target: record.target.to_string(),
        checksum: record.checksum.0.clone(),
        artifact: record.artifact.as_ref().map(|p| p.display().to_string()),
      })
      .collect();
    let mut skipped: Vec<SkippedTarget> = report
      .skipped
      .iter()
      .map(|(target, failed)| SkippedTarget {
        target: target.to_string(),
        failed_dependency: failed.to_string(),
      })
      .collect();
    skipped.sort_by(|a, b| a.target.cmp(&b.target));

    print_json(&BuildOutput {
      success: report.is_success(),
      resolved,
      failed: report
        .failed
        .iter()
        .map(|(target, err)| FailedTarget {
          target: target.to_string(),
          error: err.to_string(),
          output: err.partial_output().map(str::to_string),
        })
        .collect(),
      skipped,
      executed: report.executed,
      cache_hits: report.cache_hits,
      elapsed_ms: report.elapsed.as_millis(),
    })?;
  } else {
    for record in build.artifacts() {
      match &record.artifact {
        Some(artifact) => print_success(&format!("{} {}", record.target, artifact.display())),
        None => print_success(&record.target.to_string()),
      }
    }
    for (target, err) in &report.failed {
      print_error(&format!("{}: {}", target, err));
      if let Some(output) = err.partial_output() {
        print_captured(output);
      }
    }
    for (target, failed) in &report.skipped {
      print_warning(&format!("{} skipped ({} failed)", target, failed));
    }
    println!();
    print_stat("Targets", &build.plan.len().to_string());
    print_stat("Executed", &report.executed.to_string());
    print_stat("Cached", &report.cache_hits.to_string());
    print_stat("Elapsed", &format_duration(report.elapsed));
  }

  if !build.is_success() {
    bail!(
      "{} target(s) failed, {} skipped",
      report.failed.len(),
      report.skipped.len()
    );
  }

  Ok(())
}
