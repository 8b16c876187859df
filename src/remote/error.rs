// ABOUTME: Errors raised while preparing or running work on a remote host.
// ABOUTME: Step failures are carried by the execution report and surface here via into_result.

use crate::poll::ProbeResult;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{host} never became reachable: {result}")]
    Unreachable { host: String, result: ProbeResult },

    #[error("SSH transport error: {0}")]
    Transport(#[from] crate::ssh::Error),

    #[error("failed to materialize {path}: {reason}")]
    Materialize { path: String, reason: String },

    #[error("{path} is missing or empty after upload")]
    EnvironmentIncomplete { path: String },

    #[error("steps use {{compose}} but no compose descriptor is uploaded to {directory}")]
    MissingComposeFile { directory: String },

    #[error("no compose tool found on {host} (checked docker compose, docker-compose, podman-compose)")]
    ComposeUnavailable { host: String },

    #[error("step '{step}' failed: {detail}")]
    StepFailed { step: String, detail: String },

    #[error("remote execution cancelled")]
    Cancelled,
}
