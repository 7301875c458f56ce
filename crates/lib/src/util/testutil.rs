//! Test fixtures for kettle-lib.
//!
//! Builders for in-memory manifests plus cross-platform shell snippets for
//! tests that run real commands.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::execute::{ActionRequest, ExecutorOutput, ToolchainError, ToolchainExecutor};
use crate::ident::{Identifier, TargetKey};
use crate::manifest::{
  Action, ConfigurationDecl, DependencyDecl, ExportDecl, Manifest, PackageDecl, ProviderDecl, SourceSet, TargetDecl,
};

pub fn id(s: &str) -> Identifier {
  Identifier::new(s).unwrap()
}

pub fn key(package: &str, name: &str) -> TargetKey {
  TargetKey::new(id(package), id(name))
}

/// Private dependency on `reference`.
pub fn dep(reference: &str) -> DependencyDecl {
  DependencyDecl::new(id(reference))
}

/// Public dependency on `reference`.
pub fn public(reference: &str) -> DependencyDecl {
  DependencyDecl::new(id(reference)).public()
}

/// A library action compiling every `.cpp` under `source`.
pub fn library_action(name: &str) -> Action {
  Action::BuildLibrary {
    name: name.to_string(),
    sources: SourceSet::new("source", &["**/*.cpp"]),
    command: None,
  }
}

pub fn manifest(packages: Vec<PackageDecl>) -> Manifest {
  Manifest {
    packages,
    ..Default::default()
  }
}

pub struct PackageBuilder {
  decl: PackageDecl,
}

impl PackageBuilder {
  pub fn new(name: &str) -> Self {
    Self {
      decl: PackageDecl {
        name: id(name),
        title: None,
        source: None,
        path: PathBuf::from("."),
        targets: Vec::new(),
        configurations: Vec::new(),
      },
    }
  }

  pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
    self.decl.path = path.into();
    self
  }

  /// A target without a provider.
  pub fn target(mut self, name: &str, depends: Vec<DependencyDecl>) -> Self {
    self.decl.targets.push(TargetDecl {
      name: id(name),
      depends,
      provides: None,
    });
    self
  }

  /// A target providing `capability` with a library action named after it.
  pub fn library(mut self, name: &str, capability: &str, depends: Vec<DependencyDecl>, exports: ExportDecl) -> Self {
    self.decl.targets.push(TargetDecl {
      name: id(name),
      depends,
      provides: Some(ProviderDecl {
        capability: id(capability),
        action: library_action(name),
        exports,
      }),
    });
    self
  }

  pub fn provider(mut self, name: &str, depends: Vec<DependencyDecl>, provider: ProviderDecl) -> Self {
    self.decl.targets.push(TargetDecl {
      name: id(name),
      depends,
      provides: Some(provider),
    });
    self
  }

  pub fn configuration(mut self, decl: ConfigurationDecl) -> Self {
    self.decl.configurations.push(decl);
    self
  }

  pub fn build(self) -> PackageDecl {
    self.decl
  }
}

/// Exports that publish a header search path and the built artifact.
pub fn headers(path: &str) -> ExportDecl {
  ExportDecl {
    link_artifact: true,
    header_search_paths: vec![path.to_string()],
    ..Default::default()
  }
}

/// Three packages under `root`, each with one source file:
///
/// - `vizor`: `Library/Vizor`
/// - `streams`: `Library/Streams`
/// - `vizor-platform`: `Library/Vizor/Platform` (public on `Library/Vizor`,
///   private on `Library/Streams`) and `Executable/VizorPlatform` on top.
///
/// Every library exports its `source` directory and its artifact.
pub fn vizor_manifest(root: &Path) -> Manifest {
  for (package, file) in [
    ("vizor", "Vizor.cpp"),
    ("streams", "Streams.cpp"),
    ("vizor-platform", "Platform.cpp"),
  ] {
    let dir = root.join(package).join("source");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(file), format!("// {}", file)).unwrap();
  }

  let mut m = manifest(vec![
    PackageBuilder::new("vizor")
      .path(root.join("vizor"))
      .library("vizor-library", "Library/Vizor", vec![dep("Language/C++14")], headers("source"))
      .build(),
    PackageBuilder::new("streams")
      .path(root.join("streams"))
      .library("streams-library", "Library/Streams", vec![], headers("source"))
      .build(),
    PackageBuilder::new("vizor-platform")
      .path(root.join("vizor-platform"))
      .library(
        "vizor-platform-library",
        "Library/Vizor/Platform",
        vec![public("Library/Vizor"), dep("Library/Streams")],
        headers("source"),
      )
      .library(
        "vizor-platform-app",
        "Executable/VizorPlatform",
        vec![dep("Library/Vizor/Platform")],
        ExportDecl::default(),
      )
      .build(),
  ]);
  m.externals.push(id("Language/C++14"));
  m
}

/// A toolchain that records every request and pretends to build the
/// conventional artifact.
#[derive(Default)]
pub struct RecordingExecutor {
  requests: Mutex<Vec<ActionRequest>>,
  delay: Duration,
  failing: HashSet<String>,
}

impl RecordingExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Fail every request for a target with one of these names.
  pub fn failing(mut self, names: &[&str]) -> Self {
    self.failing = names.iter().map(|n| n.to_string()).collect();
    self
  }

  pub fn calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  pub fn request_for(&self, name: &str) -> Option<ActionRequest> {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .find(|r| r.target.name.as_str() == name)
      .cloned()
  }

  /// Target names in the order they were executed.
  pub fn order(&self) -> Vec<String> {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .map(|r| r.target.name.to_string())
      .collect()
  }
}

#[async_trait]
impl ToolchainExecutor for RecordingExecutor {
  async fn execute(&self, request: &ActionRequest) -> Result<ExecutorOutput, ToolchainError> {
    self.requests.lock().unwrap().push(request.clone());
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    if self.failing.contains(request.target.name.as_str()) {
      return Err(ToolchainError::new("compiler exited with code 1").with_output("error: expected ';'"));
    }
    Ok(ExecutorOutput {
      artifact: Some(request.out_dir.join(request.action.artifact_file_name())),
      metadata: Default::default(),
    })
  }
}

/// The shell command that writes `content` to `$out/<file>`, using shell
/// builtins only since `PATH` is not set inside actions.
#[cfg(unix)]
pub fn write_output(file: &str, content: &str) -> String {
  format!("printf '%s' '{}' > \"$out/{}\"", content, file)
}

#[cfg(windows)]
pub fn write_output(file: &str, content: &str) -> String {
  format!("Set-Content -NoNewline -Path (Join-Path $env:out '{}') -Value '{}'", file, content)
}

/// A command that prints to stderr and exits non-zero.
#[cfg(unix)]
pub fn failing_command(message: &str) -> String {
  format!("echo '{}' >&2; exit 3", message)
}

#[cfg(windows)]
pub fn failing_command(message: &str) -> String {
  format!("[Console]::Error.WriteLine('{}'); exit 3", message)
}
