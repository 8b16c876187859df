// ABOUTME: Runs local shell commands for stages like lint and test.
// ABOUTME: Commands get run metadata through SHIPYARD_* environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

use crate::poll::CancellationToken;

/// A shell command configured for a local stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalCommand {
    pub name: String,
    /// Passed to `sh -c`.
    pub run: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl LocalCommand {
    pub fn new(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: run.into(),
            working_dir: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }
}

/// Result of running a local command.
#[derive(Debug)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LocalError {
    #[error("failed to start '{name}': {reason}")]
    Spawn { name: String, reason: String },

    #[error("'{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("'{name}' cancelled")]
    Cancelled { name: String },
}

/// Run `command` with the extra environment `context`.
///
/// The child is killed if the timeout elapses or the run is cancelled.
pub async fn run_command(
    command: &LocalCommand,
    context: &BTreeMap<String, String>,
    default_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandResult, LocalError> {
    let timeout = command.timeout.unwrap_or(default_timeout);
    tracing::debug!(command = %command.name, ?timeout, "running local command");

    let mut process = Command::new("sh");
    process
        .arg("-c")
        .arg(&command.run)
        .envs(context)
        .envs(&command.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref dir) = command.working_dir {
        process.current_dir(dir);
    }

    let child = process.spawn().map_err(|e| LocalError::Spawn {
        name: command.name.clone(),
        reason: e.to_string(),
    })?;

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(LocalError::Cancelled { name: command.name.clone() });
        }
        result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
            Ok(output) => output.map_err(|e| LocalError::Spawn {
                name: command.name.clone(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                return Err(LocalError::Timeout {
                    name: command.name.clone(),
                    timeout,
                });
            }
        },
    };

    let result = CommandResult {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };
    if result.success {
        tracing::debug!(command = %command.name, "local command succeeded");
    } else {
        tracing::debug!(command = %command.name, exit_code = ?result.exit_code, "local command failed");
    }
    Ok(result)
}
