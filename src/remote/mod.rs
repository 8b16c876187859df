// ABOUTME: Remote host execution: trust, liveness, environment materialization, ordered steps.
// ABOUTME: The transport sits behind the Connector and RemoteShell traits.

mod compose;
mod environment;
mod error;
mod executor;
mod shell;
mod step;

pub use compose::{COMPOSE_FILE_NAMES, ComposeTool, detect_compose, is_compose_descriptor};
pub use environment::{Artifact, DeploymentEnvironment, ENV_FILE_NAME, render_env_file};
pub use error::RemoteError;
pub use executor::{RemoteExecutor, RemoteTarget};
pub use shell::{Connector, RemoteShell, SshConnector, shell_quote};
pub use step::{ExecutionReport, ScriptStep, StepReport, StepStatus};
pub(crate) use step::tail;
