// ABOUTME: Final record of a pipeline run: every stage's status, the verdict, and the exit code.
// ABOUTME: Serializable for JSON output and printable as a human-readable summary.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::context::TriggerContext;
use super::stage::StageStatus;
use crate::diagnostics::Warning;
use crate::health::Verdict;
use crate::types::StageId;

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub id: StageId,
    pub status: StageStatus,
    pub best_effort: bool,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Failure message, or why the stage was skipped or cancelled.
    pub detail: Option<String>,
}

impl StageRecord {
    pub(crate) fn pending(id: StageId, best_effort: bool) -> Self {
        Self {
            id,
            status: StageStatus::Pending,
            best_effort,
            duration: Duration::ZERO,
            detail: None,
        }
    }

    /// A required stage that Failed or was Cancelled.
    pub fn is_blocking_failure(&self) -> bool {
        !self.best_effort && matches!(self.status, StageStatus::Failed | StageStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub trigger: TriggerContext,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Stages in graph order.
    pub stages: Vec<StageRecord>,
    pub verdict: Option<Verdict>,
    /// The first required-stage failure, in completion order.
    pub first_error: Option<String>,
    pub cancelled: Option<String>,
    pub outputs: BTreeMap<String, String>,
    /// Best-effort stage problems.
    pub warnings: Vec<Warning>,
}

impl RunReport {
    pub fn stage(&self, id: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.id.as_str() == id)
    }

    pub fn status_of(&self, id: &str) -> Option<StageStatus> {
        self.stage(id).map(|s| s.status)
    }

    /// Healthy verdict when one was recorded; otherwise no required stage failed or was cancelled.
    pub fn is_success(&self) -> bool {
        match self.verdict {
            Some(ref verdict) => verdict.healthy(),
            None => !self.stages.iter().any(StageRecord::is_blocking_failure),
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} ({} on {}) finished in {:.1}s",
            self.trigger.run_id,
            self.trigger.event,
            self.trigger.host,
            self.duration.as_secs_f64()
        )?;
        for stage in &self.stages {
            write!(f, "  {:<16} {}", stage.id.as_str(), stage.status)?;
            if stage.best_effort {
                f.write_str(" (best effort)")?;
            }
            if let Some(ref detail) = stage.detail {
                write!(f, ": {detail}")?;
            }
            writeln!(f)?;
        }
        if let Some(ref verdict) = self.verdict {
            writeln!(f, "verdict: {verdict}")?;
            for probe in verdict.probes() {
                write!(
                    f,
                    "  {:<16} {} after {} attempt(s), {:.1}s",
                    probe.name,
                    if probe.success { "up" } else { "down" },
                    probe.attempts,
                    probe.latency.as_secs_f64()
                )?;
                if let Some(ref err) = probe.last_error {
                    write!(f, " ({err})")?;
                }
                writeln!(f)?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {warning}")?;
        }
        if let Some(ref reason) = self.cancelled {
            writeln!(f, "cancelled: {reason}")?;
        }
        if let Some(ref err) = self.first_error {
            writeln!(f, "first failure: {err}")?;
        }
        Ok(())
    }
}
