// ABOUTME: Stages made of local shell commands: prepare, test and monitoring.
// ABOUTME: Prepare also resolves the run's secrets and checks the ones later stages need.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{CommandsConfig, EnvValue, resolve_needed_secrets};
use crate::local::{LocalCommand, run_command};
use crate::pipeline::{StageContext, StageError, StageRunner, Trigger};
use crate::remote::tail;
use crate::secrets::SecretSet;

/// Secrets resolved once by prepare and read by later stages.
pub type SecretSlot = Arc<OnceLock<SecretSet>>;

const STDERR_TAIL_LINES: usize = 5;

/// Runs local commands in order; the first failure fails the stage.
#[derive(Debug)]
pub struct CommandsStage {
    commands: Vec<LocalCommand>,
    timeout: Duration,
    secrets: SecretSlot,
}

impl CommandsStage {
    pub fn new(config: &CommandsConfig, base_dir: &Path, secrets: SecretSlot) -> Self {
        let commands = config
            .commands
            .iter()
            .map(|cmd| {
                let mut cmd = cmd.clone();
                cmd.working_dir = Some(match cmd.working_dir {
                    Some(ref dir) => base_dir.join(dir),
                    None => base_dir.to_path_buf(),
                });
                cmd
            })
            .collect();
        Self {
            commands,
            timeout: config.command_timeout,
            secrets,
        }
    }

    async fn run_all(&self, ctx: &StageContext) -> Result<(), StageError> {
        let env = ctx.trigger().to_env();
        for command in &self.commands {
            if ctx.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            tracing::debug!(stage = %ctx.stage(), command = %command.name, "running command");
            let result = run_command(command, &env, self.timeout, ctx.cancel_token()).await?;
            if !result.success {
                let stderr = tail(&result.stderr, STDERR_TAIL_LINES);
                let stderr = match self.secrets.get() {
                    Some(secrets) => secrets.redact(&stderr),
                    None => stderr,
                };
                let code = result
                    .exit_code
                    .map(|c| format!("exit code {c}"))
                    .unwrap_or_else(|| "killed by signal".to_string());
                return Err(StageError::CommandFailed {
                    name: command.name.clone(),
                    detail: if stderr.is_empty() {
                        code
                    } else {
                        format!("{code}: {stderr}")
                    },
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StageRunner for CommandsStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageError> {
        self.run_all(ctx).await
    }
}

/// Resolves secrets, then runs the prepare commands.
#[derive(Debug)]
pub struct PrepareStage {
    sources: BTreeMap<String, EnvValue>,
    /// Secret keys, and the triggers of the stages that need them.
    required: Vec<(String, BTreeSet<Trigger>)>,
    commands: CommandsStage,
    slot: SecretSlot,
}

impl PrepareStage {
    pub fn new(
        sources: BTreeMap<String, EnvValue>,
        required: Vec<(String, BTreeSet<Trigger>)>,
        commands: CommandsStage,
        slot: SecretSlot,
    ) -> Self {
        Self {
            sources,
            required,
            commands,
            slot,
        }
    }

    fn resolve(&self, event: Trigger) -> Result<SecretSet, StageError> {
        let needed: BTreeSet<&str> = self
            .required
            .iter()
            .filter(|(_, triggers)| triggers.contains(&event))
            .map(|(key, _)| key.as_str())
            .collect();
        // Unset sources for other keys are left out; the stages using them decide.
        let secrets = resolve_needed_secrets(&self.sources, |key| needed.contains(key))
            .map_err(|e| StageError::Config(e.to_string()))?;
        for key in &needed {
            secrets.require(key)?;
        }
        Ok(secrets)
    }
}

#[async_trait]
impl StageRunner for PrepareStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageError> {
        let secrets = self.resolve(ctx.trigger().event)?;
        tracing::info!(count = secrets.len(), "secrets resolved");
        if self.slot.set(secrets).is_err() {
            return Err(StageError::Config("secrets were already resolved for this run".into()));
        }
        self.commands.run_all(ctx).await
    }
}
