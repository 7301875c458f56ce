mod build;
mod compose;
mod info;
mod plan;
mod resolve;

pub use build::cmd_build;
pub use compose::cmd_compose;
pub use info::cmd_info;
pub use plan::cmd_plan;
pub use resolve::cmd_resolve;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::debug;

use kettle_lib::engine::Engine;
use kettle_lib::environment::{BuildMode, Environment};
use kettle_lib::execute::BuildConfig;
use kettle_lib::host::HostContext;
use kettle_lib::ident::Identifier;
use kettle_lib::manifest::JsonManifestFile;
use kettle_lib::platform::paths::build_prefix;
use kettle_lib::provider::ProviderStore;

/// Settings shared by every command that loads a manifest.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
  /// Path to the JSON manifest
  #[arg(short, long, global = true, default_value = "kettle.json")]
  pub manifest: PathBuf,

  /// Root configuration selecting the active packages (all packages if omitted)
  #[arg(short, long, global = true)]
  pub config: Option<String>,

  /// Host identifier to resolve for (detected if omitted), e.g. x86_64-linux
  #[arg(long, global = true)]
  pub host: Option<String>,

  /// Build mode
  #[arg(long, global = true, default_value = "debug")]
  pub mode: BuildMode,

  /// Maximum number of targets built in parallel
  #[arg(short, long, global = true)]
  pub jobs: Option<usize>,

  /// Environment variable passed to every action, as KEY=VALUE
  #[arg(short = 'e', long = "env", global = true, value_parser = parse_variable)]
  pub variables: Vec<(String, String)>,
}

impl RunArgs {
  pub fn environment(&self) -> Environment {
    let host = match &self.host {
      Some(host) => HostContext::new(host.clone()),
      None => HostContext::detect(),
    };
    let mut environment = Environment::new(host, self.mode, build_prefix());
    for (key, value) in &self.variables {
      environment = environment.with_variable(key.clone(), value.clone());
    }
    environment
  }

  /// Load the manifest and build the requirement graph.
  pub fn engine(&self) -> Result<Engine> {
    if !self.manifest.exists() {
      bail!("manifest not found: {}", self.manifest.display());
    }

    debug!(manifest = ?self.manifest, config = ?self.config, "loading manifest");
    let source = JsonManifestFile::new(&self.manifest);
    let mut builder = Engine::open(&source, self.environment())
      .with_context(|| format!("Failed to load manifest: {}", self.manifest.display()))?
      .store(ProviderStore::default_store());

    if let Some(jobs) = self.jobs {
      builder = builder.config(BuildConfig::with_parallelism(jobs));
    }
    if let Some(config) = &self.config {
      let name: Identifier = config
        .parse()
        .with_context(|| format!("Invalid configuration name: {}", config))?;
      builder = builder.root_configuration(name);
    }

    builder.load().context("Failed to resolve requirement graph")
  }
}

fn parse_variable(s: &str) -> Result<(String, String), String> {
  match s.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn variables_split_on_first_equals() {
    assert_eq!(
      parse_variable("CXXFLAGS=-O2 -DX=1").unwrap(),
      ("CXXFLAGS".to_string(), "-O2 -DX=1".to_string())
    );
    assert_eq!(parse_variable("EMPTY=").unwrap(), ("EMPTY".to_string(), String::new()));
    assert!(parse_variable("=value").is_err());
    assert!(parse_variable("novalue").is_err());
  }
}
