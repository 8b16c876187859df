// ABOUTME: Runs an ordered step list on a remote host after establishing trust and liveness.
// ABOUTME: A non-tolerant failure stops the run; later steps are recorded as not run.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::compose::{ComposeTool, detect_compose};
use super::environment::DeploymentEnvironment;
use super::error::RemoteError;
use super::shell::{Connector, RemoteShell, shell_quote};
use super::step::{ExecutionReport, ScriptStep, StepReport, StepStatus, tail};
use crate::poll::{CancellationToken, PollSettings, ReadinessPoller};
use crate::ssh::{Credential, HostTrust};

const TAIL_LINES: usize = 20;

/// The host a deployment runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub trust: HostTrust,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>, trust: HostTrust) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            trust,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

pub struct RemoteExecutor {
    connector: Arc<dyn Connector>,
    liveness: PollSettings,
    cancel: CancellationToken,
    step_timeout: Duration,
    io_timeout: Duration,
}

impl std::fmt::Debug for RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("liveness", &self.liveness)
            .field("step_timeout", &self.step_timeout)
            .finish()
    }
}

impl RemoteExecutor {
    pub fn new(
        connector: Arc<dyn Connector>,
        liveness: PollSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            liveness,
            cancel,
            step_timeout: Duration::from_secs(600),
            io_timeout: Duration::from_secs(60),
        }
    }

    /// Default timeout for steps that do not set their own.
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Timeout for uploads, checks and detection commands.
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Connect, materialize `environment`, and run `steps` in order.
    ///
    /// Errors before the first step (unreachable host, rejected key, incomplete upload)
    /// are returned directly. Step failures are recorded in the report; use
    /// [`ExecutionReport::into_result`] to treat them as errors.
    pub async fn execute(
        &self,
        target: &RemoteTarget,
        credential: &Credential,
        environment: &DeploymentEnvironment,
        steps: &[ScriptStep],
    ) -> Result<ExecutionReport, RemoteError> {
        if steps.iter().any(ScriptStep::needs_compose)
            && environment.compose_descriptor().is_none()
        {
            return Err(RemoteError::MissingComposeFile {
                directory: environment.directory().to_string(),
            });
        }
        let shell = self.await_live(target, credential).await?;
        let result = self.run_on(shell.as_ref(), target, environment, steps).await;
        if let Err(e) = shell.close().await {
            tracing::debug!(host = %target.host, error = %e, "error closing remote session");
        }
        result
    }

    async fn await_live(
        &self,
        target: &RemoteTarget,
        credential: &Credential,
    ) -> Result<Box<dyn RemoteShell>, RemoteError> {
        let poller = ReadinessPoller::new(self.liveness, self.cancel.clone());
        let probe_name = format!("ssh {}:{}", target.host, target.port);
        let io_timeout = self.io_timeout;

        let polled = poller
            .poll_for(&probe_name, || {
                let connector = Arc::clone(&self.connector);
                async move {
                    let shell = connector
                        .connect(target, credential)
                        .await
                        .map_err(|e| e.to_string())?;
                    let output = shell
                        .exec("true", io_timeout)
                        .await
                        .map_err(|e| e.to_string())?;
                    if output.success() {
                        Ok(Some(shell))
                    } else {
                        Err(format!("trivial command exited with {}", output.exit_code))
                    }
                }
            })
            .await;

        match polled.value {
            Some(shell) => {
                tracing::debug!(host = %target.host, attempts = polled.result.attempts, "remote host live");
                Ok(shell)
            }
            None if polled.result.is_cancelled() => Err(RemoteError::Cancelled),
            None => Err(RemoteError::Unreachable {
                host: target.host.clone(),
                result: polled.result,
            }),
        }
    }

    async fn run_on(
        &self,
        shell: &dyn RemoteShell,
        target: &RemoteTarget,
        environment: &DeploymentEnvironment,
        steps: &[ScriptStep],
    ) -> Result<ExecutionReport, RemoteError> {
        let compose = if steps.iter().any(ScriptStep::needs_compose) {
            match detect_compose(shell, self.io_timeout).await? {
                Some(tool) => Some(tool),
                None => {
                    return Err(RemoteError::ComposeUnavailable {
                        host: target.host.clone(),
                    });
                }
            }
        } else {
            None
        };

        let files = environment.materialize(shell, self.io_timeout).await?;

        let mut report = ExecutionReport {
            host: target.host.clone(),
            compose,
            files,
            steps: Vec::with_capacity(steps.len()),
            cancelled: false,
        };

        let mut aborted = false;
        for step in steps {
            if aborted {
                report.steps.push(StepReport::not_run(&step.name));
                continue;
            }
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                aborted = true;
                report.steps.push(StepReport::not_run(&step.name));
                continue;
            }

            let step_report = self.run_step(shell, environment, compose, step).await;
            match step_report.status {
                StepStatus::Failed => {
                    tracing::warn!(host = %target.host, step = %step.name, "remote step failed");
                    aborted = true;
                    report.cancelled = self.cancel.is_cancelled();
                }
                StepStatus::Tolerated => {
                    tracing::warn!(host = %target.host, step = %step.name, "tolerant step failed, continuing");
                }
                _ => tracing::debug!(host = %target.host, step = %step.name, "remote step succeeded"),
            }
            report.steps.push(step_report);
        }

        Ok(report)
    }

    async fn run_step(
        &self,
        shell: &dyn RemoteShell,
        environment: &DeploymentEnvironment,
        compose: Option<ComposeTool>,
        step: &ScriptStep,
    ) -> StepReport {
        let mut command = step.command.clone();
        if let Some(tool) = compose {
            command = command.replace("{compose}", tool.command());
        }
        let command = format!("cd {} && {command}", shell_quote(environment.directory()));
        let timeout = step.timeout.unwrap_or(self.step_timeout);
        let secrets = environment.secrets();

        tracing::debug!(step = %step.name, ?timeout, "running remote step");
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = shell.exec(&command, timeout) => Some(result),
        };
        let duration = start.elapsed();

        let failed_status = if step.tolerant {
            StepStatus::Tolerated
        } else {
            StepStatus::Failed
        };

        let mut step_report = StepReport {
            duration,
            ..StepReport::not_run(&step.name)
        };
        match result {
            None => {
                step_report.status = StepStatus::Failed;
                step_report.error = Some("cancelled".to_string());
            }
            Some(Err(e)) => {
                step_report.status = failed_status;
                step_report.error = Some(secrets.redact(&e.to_string()));
            }
            Some(Ok(output)) => {
                step_report.status = if output.success() {
                    StepStatus::Succeeded
                } else {
                    failed_status
                };
                step_report.exit_code = Some(output.exit_code);
                step_report.stdout_tail = secrets.redact(&tail(&output.stdout, TAIL_LINES));
                step_report.stderr_tail = secrets.redact(&tail(&output.stderr, TAIL_LINES));
            }
        }
        step_report
    }
}
