//! Implementation of the `kettle info` command.

use anyhow::Result;
use serde::Serialize;

use kettle_lib::platform::paths::{build_prefix, cache_dir, providers_dir};
use kettle_lib::platform::{host_identifier, is_known_host};
use kettle_lib::provider::ProviderStore;

use crate::cmd::RunArgs;
use crate::output::{OutputFormat, format_bytes, print_info, print_json, print_stat, print_warning};

#[derive(Serialize)]
struct InfoOutput {
  version: &'static str,
  detected_host: String,
  known_host: bool,
  host: String,
  build_mode: String,
  fingerprint: String,
  cache_dir: String,
  build_prefix: String,
  cache_environments: usize,
  cache_entries: usize,
  cache_bytes: u64,
}

pub fn cmd_info(args: &RunArgs, output: OutputFormat) -> Result<()> {
  let environment = args.environment();
  let stats = ProviderStore::new(providers_dir()).stats()?;

  let info = InfoOutput {
    version: env!("CARGO_PKG_VERSION"),
    detected_host: host_identifier(),
    known_host: is_known_host(&environment.host.to_string()),
    host: environment.host.to_string(),
    build_mode: environment.build_mode.to_string(),
    fingerprint: environment.fingerprint()?.0,
    cache_dir: cache_dir().display().to_string(),
    build_prefix: build_prefix().display().to_string(),
    cache_environments: stats.environments,
    cache_entries: stats.entries,
    cache_bytes: stats.bytes,
  };

  if output.is_json() {
    return print_json(&info);
  }

  print_info(&format!("kettle v{}", info.version));
  println!();
  print_stat("Detected host", &info.detected_host);
  print_stat("Host", &info.host);
  if !info.known_host {
    print_warning(&format!("{} is not a known ARCH-OS pair", info.host));
  }
  print_stat("Build mode", &info.build_mode);
  print_stat("Fingerprint", &info.fingerprint);
  print_stat("Cache", &info.cache_dir);
  print_stat("Build prefix", &info.build_prefix);
  print_stat(
    "Cached records",
    &format!(
      "{} in {} environment(s), {}",
      info.cache_entries,
      info.cache_environments,
      format_bytes(info.cache_bytes)
    ),
  );

  Ok(())
}
