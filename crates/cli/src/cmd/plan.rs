//! Implementation of the `kettle plan` command.
//!
//! Prints the build order without running anything. With `--checksums`,
//! sources are hashed and each target's cache key is shown.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Serialize;

use kettle_lib::checksum::Checksum;
use kettle_lib::ident::TargetKey;

use crate::cmd::RunArgs;
use crate::output::{OutputFormat, print_info, print_json, print_stat, truncate_hash};

#[derive(Serialize)]
struct PlanOutput {
  roots: Vec<String>,
  waves: Vec<Vec<PlannedTarget>>,
}

#[derive(Serialize)]
struct PlannedTarget {
  target: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  checksum: Option<String>,
}

pub fn cmd_plan(args: &RunArgs, targets: &[String], checksums: bool, output: OutputFormat) -> Result<()> {
  let engine = args.engine()?;
  let plan = engine.plan(targets).context("Failed to plan build")?;

  let keys: HashMap<TargetKey, Checksum> = if checksums {
    engine.checksums(&plan).context("Failed to compute checksums")?
  } else {
    HashMap::new()
  };

  let waves: Vec<Vec<PlannedTarget>> = plan
    .waves()
    .into_iter()
    .map(|wave| {
      wave
        .into_iter()
        .map(|key| PlannedTarget {
          checksum: keys.get(&key).map(|c| c.0.clone()),
          target: key.to_string(),
        })
        .collect()
    })
    .collect();

  if output.is_json() {
    return print_json(&PlanOutput {
      roots: plan.roots.iter().map(|r| r.to_string()).collect(),
      waves,
    });
  }

  print_info(&format!("Build plan for {}", args.environment().host));
  for (index, wave) in waves.iter().enumerate() {
    println!("  Wave {}:", index + 1);
    for target in wave {
      match &target.checksum {
        Some(checksum) => println!("    {} {}", target.target, truncate_hash(checksum)),
        None => println!("    {}", target.target),
      }
    }
  }
  println!();
  print_stat("Targets", &plan.len().to_string());
  print_stat("Waves", &waves.len().to_string());

  Ok(())
}
