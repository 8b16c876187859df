// ABOUTME: Remote script steps and the per-step execution report.
// ABOUTME: Output tails are stored already redacted.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::compose::ComposeTool;
use super::error::RemoteError;

/// One command run in the deployment directory.
///
/// `{compose}` in the command is replaced with the detected compose tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptStep {
    pub name: String,
    pub command: String,
    /// A failing tolerant step is recorded and execution continues.
    #[serde(default)]
    pub tolerant: bool,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl ScriptStep {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            tolerant: false,
            timeout: None,
        }
    }

    pub fn tolerant(mut self) -> Self {
        self.tolerant = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn needs_compose(&self) -> bool {
        self.command.contains("{compose}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Failed, but the step was marked tolerant.
    Tolerated,
    NotRun,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Tolerated => "tolerated",
            StepStatus::NotRun => "not run",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
    pub exit_code: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub stdout_tail: String,
    pub stderr_tail: String,
    /// Transport or timeout error when the step produced no exit code.
    pub error: Option<String>,
}

impl StepReport {
    pub(crate) fn not_run(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::NotRun,
            exit_code: None,
            duration: Duration::ZERO,
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            error: None,
        }
    }

    fn failure_detail(&self) -> String {
        if let Some(ref e) = self.error {
            return e.clone();
        }
        let code = self
            .exit_code
            .map(|c| format!("exit code {c}"))
            .unwrap_or_else(|| "no exit code".to_string());
        if self.stderr_tail.is_empty() {
            code
        } else {
            format!("{code}: {}", self.stderr_tail)
        }
    }
}

/// Outcome of running a step list against one host.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub host: String,
    pub compose: Option<ComposeTool>,
    /// Remote paths written while materializing the environment.
    pub files: Vec<String>,
    pub steps: Vec<StepReport>,
    pub cancelled: bool,
}

impl ExecutionReport {
    /// True when no step failed outright and the run was not cancelled.
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.first_failure().is_none()
    }

    pub fn first_failure(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub fn tolerated(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Tolerated)
    }

    /// Turn a failed report into the error naming the step that aborted the run.
    pub fn into_result(self) -> Result<ExecutionReport, RemoteError> {
        if self.cancelled {
            return Err(RemoteError::Cancelled);
        }
        if let Some(step) = self.first_failure() {
            return Err(RemoteError::StepFailed {
                step: step.name.clone(),
                detail: step.failure_detail(),
            });
        }
        Ok(self)
    }
}

/// Keep the last `lines` lines of `text`.
pub(crate) fn tail(text: &str, lines: usize) -> String {
    let trimmed = text.trim_end();
    let all: Vec<&str> = trimmed.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd\n", 2), "c\nd");
        assert_eq!(tail("only", 5), "only");
        assert_eq!(tail("", 5), "");
    }

    #[test]
    fn failure_names_step_and_stderr() {
        let report = ExecutionReport {
            host: "203.0.113.10".into(),
            compose: None,
            files: vec![],
            steps: vec![
                StepReport {
                    status: StepStatus::Failed,
                    exit_code: Some(2),
                    stderr_tail: "no such service".into(),
                    ..StepReport::not_run("up")
                },
                StepReport::not_run("prune"),
            ],
            cancelled: false,
        };
        let err = report.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "step 'up' failed: exit code 2: no such service"
        );
    }
}
