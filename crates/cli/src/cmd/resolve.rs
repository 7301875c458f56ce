//! Implementation of the `kettle resolve` command.

use anyhow::{Context, Result};

use kettle_lib::build_lock::BuildLock;
use kettle_lib::platform::paths::cache_dir;
use kettle_lib::provider::BuildMetadata;

use crate::cmd::RunArgs;
use crate::output::{OutputFormat, print_json, print_list, print_stat, print_success, truncate_hash};

pub fn cmd_resolve(args: &RunArgs, target: &str, output: OutputFormat) -> Result<()> {
  let engine = args.engine()?;
  let _lock = BuildLock::acquire(&cache_dir(), engine.environment(), &[target])?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let record = rt
    .block_on(engine.resolve(target))
    .with_context(|| format!("Failed to resolve {}", target))?;

  if output.is_json() {
    return print_json(record.as_ref());
  }

  print_success(&format!("Resolved {}", record.target));
  if let Some(capability) = &record.capability {
    print_stat("Capability", capability.as_str());
  }
  print_stat("Checksum", truncate_hash(&record.checksum.0));
  if let Some(artifact) = &record.artifact {
    print_stat("Artifact", &artifact.display().to_string());
  }
  print_metadata(&record.exported);

  Ok(())
}

fn print_metadata(metadata: &BuildMetadata) {
  print_list("Link flags", &metadata.link_flags);
  print_list("Header search paths", &metadata.header_search_paths);
  print_list("Asset search paths", &metadata.asset_search_paths);
}
