// ABOUTME: Deploy stage: materializes the deployment directory on the new instance and runs the steps.
// ABOUTME: Pushed image refs are added to the .env so the compose file can reference them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::commands::SecretSlot;
use super::resolved;
use crate::config::DeployConfig;
use crate::outputs::OutputKey;
use crate::pipeline::{StageContext, StageError, StageRunner};
use crate::poll::PollSettings;
use crate::remote::{
    Artifact, Connector, DeploymentEnvironment, RemoteExecutor, RemoteTarget, ScriptStep,
};
use crate::secrets::{Secret, SecretSet, keys};
use crate::ssh::{Credential, HostTrust};
use crate::types::StageId;

pub struct DeployStage {
    user: String,
    port: u16,
    directory: String,
    trust: HostTrust,
    liveness: PollSettings,
    artifacts: Vec<PathBuf>,
    env_keys: Vec<String>,
    steps: Vec<ScriptStep>,
    step_timeout: Duration,
    address_from: StageId,
    image_stages: [StageId; 2],
    connector: Arc<dyn Connector>,
    secrets: SecretSlot,
}

impl std::fmt::Debug for DeployStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployStage")
            .field("user", &self.user)
            .field("directory", &self.directory)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl DeployStage {
    pub fn new(
        config: &DeployConfig,
        base_dir: &Path,
        address_from: StageId,
        image_stages: [StageId; 2],
        connector: Arc<dyn Connector>,
        secrets: SecretSlot,
    ) -> Self {
        Self {
            user: config.user.clone(),
            port: config.port,
            directory: config.directory.clone(),
            trust: config.host_key.trust(),
            liveness: config.liveness,
            artifacts: config.artifacts.iter().map(|a| base_dir.join(a)).collect(),
            env_keys: config.env_keys.clone(),
            steps: config.steps.iter().cloned().collect(),
            step_timeout: config.step_timeout,
            address_from,
            image_stages,
            connector,
            secrets,
        }
    }

    async fn environment(
        &self,
        ctx: &StageContext,
        secrets: &SecretSet,
    ) -> Result<DeploymentEnvironment, StageError> {
        let mut env = SecretSet::new();
        for key in &self.env_keys {
            env.insert(key.clone(), secrets.require(key)?.clone());
        }
        for stage in &self.image_stages {
            if let Some(image) = ctx.get(&OutputKey::new(stage.clone(), "image")) {
                let name = stage.as_str().trim_start_matches("build-");
                env.insert(format!("{name}_IMAGE").to_uppercase(), Secret::new(image));
            }
        }

        let mut environment = DeploymentEnvironment::new(&self.directory).env(env);
        for path in &self.artifacts {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    StageError::Config(format!("artifact {} has no file name", path.display()))
                })?;
            let contents = tokio::fs::read(path).await.map_err(|e| {
                StageError::Config(format!("cannot read artifact {}: {e}", path.display()))
            })?;
            environment = environment.artifact(Artifact::new(name, contents));
        }
        Ok(environment)
    }
}

#[async_trait]
impl StageRunner for DeployStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageError> {
        let secrets = resolved(&self.secrets)?;
        let address = ctx.require(&OutputKey::new(self.address_from.clone(), "address"))?;
        let credential = Credential::KeyMaterial(secrets.require(keys::SSH_PRIVATE_KEY)?.clone());
        let environment = self.environment(ctx, secrets).await?;

        let target = RemoteTarget::new(&address, &self.user, self.trust.clone()).port(self.port);
        let executor = RemoteExecutor::new(
            Arc::clone(&self.connector),
            self.liveness,
            ctx.cancel_token().clone(),
        )
        .step_timeout(self.step_timeout);

        let report = executor
            .execute(&target, &credential, &environment, &self.steps)
            .await?
            .into_result()?;

        for step in report.tolerated() {
            tracing::warn!(host = %report.host, step = %step.name, "tolerated step failure");
        }
        tracing::info!(
            host = %report.host,
            steps = report.steps.len(),
            files = report.files.len(),
            "deployment steps finished"
        );
        ctx.publish("host", address)?;
        ctx.publish("directory", self.directory.as_str())
    }
}
