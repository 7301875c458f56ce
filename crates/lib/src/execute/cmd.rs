//! Shell-command toolchain executor.
//!
//! Runs an action's `command` in an isolated environment:
//! - Clears all environment variables
//! - Sets PATH to /path-not-set unless the build environment supplies one
//! - Sets HOME to /homeless-shelter
//! - Sets TMPDIR/TMP/TEMP/TEMPDIR to a temp directory within the output dir
//! - Sets `out` to the output directory
//! - Exposes the action inputs as `KETTLE_*` variables (newline-separated lists)
//! - Merges the build environment's variables
//!
//! The command may report metadata on stdout, one directive per line:
//!
//! ```text
//! kettle:link-flag=-lpthread
//! kettle:header-search-path=/opt/include
//! kettle:asset-search-path=/opt/assets
//! kettle:artifact=/custom/location/libfoo.a
//! ```
//!
//! Without an `artifact` directive, the artifact is the action's conventional
//! file name inside the output directory, if the command created it.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::manifest::Action;

use super::executor::{ActionRequest, ExecutorOutput, ToolchainError, ToolchainExecutor};

const DIRECTIVE_PREFIX: &str = "kettle:";

#[derive(Debug, Default, Clone)]
pub struct CommandExecutor {
  shell: Option<String>,
}

impl CommandExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Use `shell` instead of the platform default.
  pub fn with_shell(shell: impl Into<String>) -> Self {
    Self {
      shell: Some(shell.into()),
    }
  }
}

fn io_error(context: &str, path: &Path, e: io::Error) -> ToolchainError {
  ToolchainError::new(format!("{} {}: {}", context, path.display(), e))
}

fn join_lines<I, S>(items: I) -> String
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  items.into_iter().map(|s| s.as_ref().to_string()).collect::<Vec<_>>().join("\n")
}

#[async_trait]
impl ToolchainExecutor for CommandExecutor {
  async fn execute(&self, request: &ActionRequest) -> Result<ExecutorOutput, ToolchainError> {
    let Some(cmd) = request.action.command() else {
      debug!(target = %request.target, action = request.action.kind(), "action has no command, nothing to run");
      return Ok(ExecutorOutput::default());
    };

    info!(target = %request.target, action = request.action.kind(), "executing command");

    let out_dir = &request.out_dir;
    match tokio::fs::remove_dir_all(out_dir).await {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(io_error("failed to clear", out_dir, e)),
    }
    let tmp_dir = out_dir.join("tmp");
    tokio::fs::create_dir_all(&tmp_dir)
      .await
      .map_err(|e| io_error("failed to create", &tmp_dir, e))?;

    let (shell_cmd, shell_args) = get_shell(self.shell.as_deref());
    let env = &request.environment;
    let metadata = &request.dependency_metadata;

    let mut command = Command::new(&shell_cmd);
    command
      .args(&shell_args)
      .arg(cmd)
      .current_dir(out_dir)
      .env_clear()
      .env("PATH", "/path-not-set")
      .env("HOME", "/homeless-shelter")
      .env("TMPDIR", &tmp_dir)
      .env("TMP", &tmp_dir)
      .env("TEMP", &tmp_dir)
      .env("TEMPDIR", &tmp_dir)
      .env("out", out_dir)
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", "315532800")
      .env("KETTLE_TARGET", request.target.to_string())
      .env("KETTLE_ACTION", request.action.kind())
      .env("KETTLE_ARTIFACT", out_dir.join(request.action.artifact_file_name()))
      .env(
        "KETTLE_SOURCES",
        join_lines(request.source_files.iter().map(|p| p.to_string_lossy())),
      )
      .env("KETTLE_LINK_FLAGS", join_lines(&metadata.link_flags))
      .env("KETTLE_HEADER_SEARCH_PATHS", join_lines(&metadata.header_search_paths))
      .env("KETTLE_ASSET_SEARCH_PATHS", join_lines(&metadata.asset_search_paths))
      .env("KETTLE_BUILD_MODE", env.build_mode.to_string())
      .env("KETTLE_HOST", env.host.identifier());

    if let Action::RunTests { arguments, .. } = &request.action {
      command.env("KETTLE_ARGUMENTS", join_lines(arguments));
    }

    // Environment variables are part of the fingerprint, so they may override
    // anything above, PATH included.
    for (key, value) in &env.variables {
      command.env(key, value);
    }

    debug!(shell = %shell_cmd, working_dir = ?out_dir, "spawning process");

    let output = command
      .output()
      .await
      .map_err(|e| ToolchainError::new(format!("failed to spawn {}: {}", shell_cmd, e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "command stdout");
      }
      let message = match output.status.code() {
        Some(code) => format!("command exited with code {}", code),
        None => "command terminated by signal".to_string(),
      };
      return Err(ToolchainError::new(message).with_output(stderr.trim()));
    }

    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }

    let mut result = parse_directives(&stdout);
    if result.artifact.is_none() {
      let conventional = out_dir.join(request.action.artifact_file_name());
      if conventional.exists() {
        result.artifact = Some(conventional);
      }
    }
    Ok(result)
  }
}

/// Collect `kettle:` directives from command output.
fn parse_directives(stdout: &str) -> ExecutorOutput {
  let mut output = ExecutorOutput::default();
  for line in stdout.lines() {
    let Some(directive) = line.trim().strip_prefix(DIRECTIVE_PREFIX) else {
      continue;
    };
    let Some((key, value)) = directive.split_once('=') else {
      continue;
    };
    match key {
      "link-flag" => output.metadata.add_link_flag(value),
      "header-search-path" => output.metadata.add_header_search_path(value),
      "asset-search-path" => output.metadata.add_asset_search_path(value),
      "artifact" => output.artifact = Some(PathBuf::from(value)),
      other => debug!(directive = %other, "ignoring unknown directive"),
    }
  }
  output
}

/// Get the shell command and arguments for the current platform.
///
/// Defaults to `/bin/sh` (Unix) or `powershell.exe` (Windows) rather than the
/// user's shell, which may source profile files.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
