// ABOUTME: Diagnostics accumulator for non-fatal warnings during a pipeline run.
// ABOUTME: Collects best-effort stage problems that shouldn't fail the run but should be shown.

use serde::Serialize;

use crate::types::StageId;

/// Collects non-fatal warnings during a run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(stage = %warning.stage, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub stage: StageId,
    pub message: String,
}

impl Warning {
    /// A best-effort stage failed.
    pub fn best_effort_failure(stage: StageId, message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::BestEffortFailure,
            stage,
            message: message.into(),
        }
    }

    /// A best-effort stage was cancelled before it finished.
    pub fn best_effort_cancelled(stage: StageId, message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::BestEffortCancelled,
            stage,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A best-effort stage failed; dependents ran anyway.
    BestEffortFailure,
    /// A best-effort stage was interrupted by run cancellation.
    BestEffortCancelled,
}
