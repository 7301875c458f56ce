//! Per-environment build lock.
//!
//! `build` and `resolve` lock `<cache root>/locks/<fingerprint>.lock` for the
//! environment they build in, so two runs never write the same provider
//! entries or output directories at once. Runs in different environments do
//! not contend. The holder describes itself in `<fingerprint>.holder.json`,
//! which a blocked run reads to report what it is waiting on.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::environment::Environment;
use crate::util::hash::{HashError, ObjectHash};

const LOCK_DIR: &str = "locks";

/// The run currently building an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub pid: u32,
  pub started_at_unix: u64,
  pub fingerprint: ObjectHash,
  pub targets: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BuildLockError {
  #[error(
    "environment {} is being built by PID {} ({})\n\
     If no kettle process is running, remove the lock file:\n  {}",
    .holder.fingerprint, .holder.pid, .holder.targets.join(" "), .path.display()
  )]
  Held { holder: LockHolder, path: PathBuf },

  #[error(
    "environment {fingerprint} is locked by another process\n\
     If no kettle process is running, remove the lock file:\n  {}",
    .path.display()
  )]
  Busy { fingerprint: ObjectHash, path: PathBuf },

  #[error("cannot lock {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot fingerprint environment: {0}")]
  Fingerprint(#[from] HashError),
}

/// Held until dropped.
#[derive(Debug)]
pub struct BuildLock {
  _file: File,
  lock_path: PathBuf,
  holder_path: PathBuf,
}

impl BuildLock {
  /// Lock `environment` under `cache_root` without blocking.
  pub fn acquire<S: AsRef<str>>(
    cache_root: &Path,
    environment: &Environment,
    targets: &[S],
  ) -> Result<Self, BuildLockError> {
    let fingerprint = environment.fingerprint()?;
    let dir = cache_root.join(LOCK_DIR);
    let lock_path = dir.join(format!("{}.lock", fingerprint));
    let holder_path = dir.join(format!("{}.holder.json", fingerprint));

    std::fs::create_dir_all(&dir).map_err(|source| BuildLockError::Io {
      path: dir.clone(),
      source,
    })?;
    let file = OpenOptions::new()
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(|source| BuildLockError::Io {
        path: lock_path.clone(),
        source,
      })?;

    match try_lock_exclusive(&file) {
      Ok(()) => {}
      Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
        return Err(match read_holder(&holder_path) {
          Some(holder) => BuildLockError::Held { holder, path: lock_path },
          None => BuildLockError::Busy {
            fingerprint,
            path: lock_path,
          },
        });
      }
      Err(source) => return Err(BuildLockError::Io { path: lock_path, source }),
    }

    let holder = LockHolder {
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      fingerprint,
      targets: targets.iter().map(|t| t.as_ref().to_string()).collect(),
    };
    let json = serde_json::to_vec_pretty(&holder).map_err(|e| BuildLockError::Io {
      path: holder_path.clone(),
      source: io::Error::other(e),
    })?;
    std::fs::write(&holder_path, json).map_err(|source| BuildLockError::Io {
      path: holder_path.clone(),
      source,
    })?;

    debug!(path = ?lock_path, fingerprint = %holder.fingerprint, targets = ?holder.targets, "acquired build lock");
    Ok(BuildLock {
      _file: file,
      lock_path,
      holder_path,
    })
  }

  pub fn holder(&self) -> Option<LockHolder> {
    read_holder(&self.holder_path)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

impl Drop for BuildLock {
  fn drop(&mut self) {
    // The lock itself is released when `_file` closes, after this.
    let _ = std::fs::remove_file(&self.holder_path);
  }
}

fn read_holder(path: &Path) -> Option<LockHolder> {
  let contents = std::fs::read(path).ok()?;
  serde_json::from_slice(&contents).ok()
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  // SAFETY: `handle` is owned by `file`, and a zeroed OVERLAPPED selects offset 0.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::environment::BuildMode;
  use crate::host::HostContext;
  use tempfile::TempDir;

  fn environment(mode: BuildMode) -> Environment {
    Environment::new(HostContext::new("x86_64-linux"), mode, "/build")
  }

  #[test]
  fn holder_names_environment_and_targets() {
    let temp = TempDir::new().unwrap();
    let env = environment(BuildMode::Debug);
    let lock = BuildLock::acquire(&temp.path().join("cache"), &env, &["vizor-platform-app"]).unwrap();

    let fingerprint = env.fingerprint().unwrap();
    assert_eq!(
      lock.lock_path(),
      temp.path().join("cache/locks").join(format!("{}.lock", fingerprint))
    );
    let holder = lock.holder().unwrap();
    assert_eq!(holder.fingerprint, fingerprint);
    assert_eq!(holder.targets, vec!["vizor-platform-app"]);
    assert_eq!(holder.pid, std::process::id());
  }

  #[cfg(unix)]
  #[test]
  fn same_environment_contends() {
    let temp = TempDir::new().unwrap();
    let env = environment(BuildMode::Debug);
    let _held = BuildLock::acquire(temp.path(), &env, &["app"]).unwrap();

    match BuildLock::acquire(temp.path(), &env, &["other"]).unwrap_err() {
      BuildLockError::Held { holder, .. } => {
        assert_eq!(holder.targets, vec!["app"]);
        assert_eq!(holder.pid, std::process::id());
      }
      other => panic!("expected a named holder, got {other}"),
    }
  }

  #[test]
  fn other_environments_do_not_contend() {
    let temp = TempDir::new().unwrap();
    let debug = BuildLock::acquire(temp.path(), &environment(BuildMode::Debug), &["app"]).unwrap();
    let release = BuildLock::acquire(temp.path(), &environment(BuildMode::Release), &["app"]).unwrap();
    assert_ne!(debug.lock_path(), release.lock_path());
  }

  #[test]
  fn drop_releases_and_clears_holder() {
    let temp = TempDir::new().unwrap();
    let env = environment(BuildMode::Debug);
    let holder_path = {
      let lock = BuildLock::acquire(temp.path(), &env, &["first"]).unwrap();
      lock.holder_path.clone()
    };
    assert!(!holder_path.exists());

    let lock = BuildLock::acquire(temp.path(), &env, &["second"]).unwrap();
    assert_eq!(lock.holder().unwrap().targets, vec!["second"]);
  }
}
