use std::path::{Path, PathBuf};

use kettle_lib::engine::{Engine, EngineBuilder};
use kettle_lib::environment::{BuildMode, Environment};
use kettle_lib::execute::BuildConfig;
use kettle_lib::host::HostContext;
use kettle_lib::manifest::JsonManifestFile;
use kettle_lib::provider::ProviderStore;
use tempfile::TempDir;
use walkdir::WalkDir;

/// A private copy of a fixture workspace plus room for build outputs.
pub struct Fixture {
  pub temp: TempDir,
}

impl Fixture {
  pub fn new(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let source = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
    let dest = temp.path().join("workspace");
    for entry in WalkDir::new(&source) {
      let entry = entry.unwrap();
      let target = dest.join(entry.path().strip_prefix(&source).unwrap());
      if entry.file_type().is_dir() {
        std::fs::create_dir_all(&target).unwrap();
      } else {
        std::fs::copy(entry.path(), &target).unwrap();
      }
    }
    Self { temp }
  }

  pub fn root(&self) -> PathBuf {
    self.temp.path().join("workspace")
  }

  pub fn manifest_path(&self) -> PathBuf {
    self.root().join("kettle.json")
  }

  pub fn store(&self) -> ProviderStore {
    ProviderStore::new(self.temp.path().join("cache/providers"))
  }

  pub fn environment(&self, host: &str) -> Environment {
    Environment::new(HostContext::new(host), BuildMode::Debug, self.temp.path().join("build"))
  }

  pub fn builder(&self, host: &str) -> EngineBuilder {
    Engine::open(&JsonManifestFile::new(self.manifest_path()), self.environment(host))
      .unwrap()
      .store(self.store())
      .config(BuildConfig::with_parallelism(4))
  }

  /// Engine over the whole manifest.
  pub fn engine(&self, host: &str) -> Engine {
    self.builder(host).load().unwrap()
  }

  /// Engine over the packages required by `configuration`.
  pub fn configured(&self, host: &str, configuration: &str) -> Engine {
    self
      .builder(host)
      .root_configuration(configuration.parse().unwrap())
      .load()
      .unwrap()
  }
}

pub fn names<T: ToString>(items: impl IntoIterator<Item = T>) -> Vec<String> {
  items.into_iter().map(|i| i.to_string()).collect()
}
