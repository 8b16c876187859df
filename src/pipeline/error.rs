// ABOUTME: Errors raised by stages and by graph validation.
// ABOUTME: Stage errors are caught at the stage boundary and become a terminal status.

use std::time::Duration;

use thiserror::Error;

use crate::local::LocalError;
use crate::outputs::OutputError;
use crate::provision::{ProvisionError, ProvisionErrorKind};
use crate::registry::BuildError;
use crate::remote::RemoteError;
use crate::secrets::SecretError;
use crate::types::StageId;

/// Why a stage did not succeed.
#[derive(Debug, Error)]
pub enum StageError {
    /// Setup defect; never retried.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Local(#[from] LocalError),

    #[error("command '{name}' failed: {detail}")]
    CommandFailed { name: String, detail: String },

    #[error("health verdict: {0}")]
    Unhealthy(String),

    #[error("stage timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

impl StageError {
    /// True when the error is the stage observing run cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            StageError::Cancelled => true,
            StageError::Provision(e) => e.kind() == ProvisionErrorKind::Cancelled,
            StageError::Remote(RemoteError::Cancelled) => true,
            StageError::Local(LocalError::Cancelled { .. }) => true,
            _ => false,
        }
    }
}

/// A stage graph that cannot be executed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("stage '{0}' is defined more than once")]
    DuplicateStage(StageId),

    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency { stage: StageId, dependency: StageId },

    #[error("dependency cycle: {}", .0.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" -> "))]
    Cycle(Vec<StageId>),
}
