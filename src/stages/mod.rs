// ABOUTME: The standard release graph: prepare, test, build, provision, deploy, verify, monitoring.
// ABOUTME: Wires configuration and external collaborators into stage runners.

mod build;
mod commands;
mod deploy;
mod provision;
mod verify;

pub use build::BuildStage;
pub use commands::{CommandsStage, PrepareStage, SecretSlot};
pub use deploy::DeployStage;
pub use provision::ProvisionStage;
pub use verify::VerifyStage;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::health::{HttpClient, HyperClient};
use crate::pipeline::{Stage, StageError, StageGraph, Trigger};
use crate::provision::{CloudProvider, CommandProvider, Reachability, TcpReachability};
use crate::registry::{DockerCli, ImageBuilder};
use crate::remote::{Connector, SshConnector};
use crate::secrets::{SecretSet, keys};
use crate::types::StageId;

pub const PREPARE: &str = "prepare";
pub const TEST: &str = "test";
pub const BUILD_FRONTEND: &str = "build-frontend";
pub const BUILD_BACKEND: &str = "build-backend";
pub const PROVISION: &str = "provision";
pub const DEPLOY: &str = "deploy";
pub const VERIFY: &str = "verify";
pub const MONITORING: &str = "monitoring";

pub const ALL_STAGES: [&str; 8] = [
    PREPARE,
    TEST,
    BUILD_FRONTEND,
    BUILD_BACKEND,
    PROVISION,
    DEPLOY,
    VERIFY,
    MONITORING,
];

const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// External systems the standard stages talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn CloudProvider>,
    /// Extra readiness check for fresh instances.
    pub reachability: Option<Arc<dyn Reachability>>,
    pub connector: Arc<dyn Connector>,
    pub http: Arc<dyn HttpClient>,
    pub builder: Arc<dyn ImageBuilder>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("reachability", &self.reachability.is_some())
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// The real implementations: provider program, SSH, hyper and the docker CLI.
    pub fn from_config(config: &Config, base_dir: &Path) -> Self {
        let provision = &config.provision;
        let mut provider = CommandProvider::new(base_dir.join(&provision.program))
            .args(provision.args.iter().cloned())
            .timeout(provision.provider_timeout);
        if let Some(ref dir) = provision.working_dir {
            provider = provider.working_dir(base_dir.join(dir));
        }

        let reachability = provision
            .reachability_port
            .map(|port| Arc::new(TcpReachability::new(port)) as Arc<dyn Reachability>);

        let connect_timeout = config
            .deploy
            .liveness
            .attempt_timeout
            .unwrap_or(SSH_CONNECT_TIMEOUT);

        Self {
            provider: Arc::new(provider),
            reachability,
            connector: Arc::new(SshConnector::new(connect_timeout, config.deploy.step_timeout)),
            http: Arc::new(HyperClient::new(config.verify.request_timeout)),
            builder: Arc::new(DockerCli::default()),
        }
    }
}

pub(crate) fn stage_id(name: &str) -> Result<StageId> {
    Ok(StageId::new(name)?)
}

/// Resolved secrets, or a configuration error if prepare did not run first.
pub(crate) fn resolved(slot: &SecretSlot) -> std::result::Result<&SecretSet, StageError> {
    slot.get()
        .ok_or_else(|| StageError::Config("secrets were not resolved by the prepare stage".into()))
}

/// Build the standard release graph from `config`.
///
/// Relative paths in the config resolve against `base_dir`.
pub fn standard_graph(
    config: &Config,
    base_dir: &Path,
    collaborators: Collaborators,
) -> Result<StageGraph> {
    for id in config.pipeline.stages.keys() {
        if !ALL_STAGES.contains(&id.as_str()) {
            return Err(Error::UnknownStage {
                stage: id.clone(),
                known: ALL_STAGES.join(", "),
            });
        }
    }

    let slot = SecretSlot::default();
    let push_only = [Trigger::Push];

    let prepare_id = stage_id(PREPARE)?;
    let test_id = stage_id(TEST)?;
    let frontend_id = stage_id(BUILD_FRONTEND)?;
    let backend_id = stage_id(BUILD_BACKEND)?;
    let provision_id = stage_id(PROVISION)?;
    let deploy_id = stage_id(DEPLOY)?;
    let verify_id = stage_id(VERIFY)?;
    let monitoring_id = stage_id(MONITORING)?;

    let mut stages = vec![
        Stage::new(
            test_id.clone(),
            Arc::new(CommandsStage::new(&config.test, base_dir, slot.clone())),
        )
        .after(prepare_id.clone()),
        Stage::new(
            frontend_id.clone(),
            Arc::new(BuildStage::new(
                &config.images.frontend,
                config.images.registry.clone(),
                base_dir,
                Arc::clone(&collaborators.builder),
                slot.clone(),
            )),
        )
        .after(test_id.clone())
        .triggers(push_only),
        Stage::new(
            backend_id.clone(),
            Arc::new(BuildStage::new(
                &config.images.backend,
                config.images.registry.clone(),
                base_dir,
                Arc::clone(&collaborators.builder),
                slot.clone(),
            )),
        )
        .after(test_id.clone())
        .triggers(push_only),
        Stage::new(
            provision_id.clone(),
            Arc::new(ProvisionStage::new(
                config.app.name.clone(),
                &config.provision,
                Arc::clone(&collaborators.provider),
                collaborators.reachability.clone(),
                slot.clone(),
            )),
        )
        .after(test_id.clone())
        .triggers(push_only),
        Stage::new(
            deploy_id.clone(),
            Arc::new(DeployStage::new(
                &config.deploy,
                base_dir,
                provision_id.clone(),
                [frontend_id.clone(), backend_id.clone()],
                Arc::clone(&collaborators.connector),
                slot.clone(),
            )),
        )
        .after(frontend_id)
        .after(backend_id)
        .after(provision_id.clone())
        .triggers(push_only),
        Stage::new(
            verify_id,
            Arc::new(VerifyStage::new(
                &config.verify,
                provision_id,
                Arc::clone(&collaborators.http),
            )),
        )
        .after(deploy_id.clone())
        .triggers(push_only),
        Stage::new(
            monitoring_id,
            Arc::new(CommandsStage::new(&config.monitoring, base_dir, slot.clone())),
        )
        .after(deploy_id)
        .best_effort()
        .triggers(push_only),
    ];

    // Overrides go on before prepare decides which secrets are needed.
    stages = stages
        .into_iter()
        .map(|stage| apply_override(stage, config))
        .collect();

    let mut required = Vec::new();
    for stage in &stages {
        let triggers: BTreeSet<Trigger> = stage.trigger_filter().collect();
        match stage.id().as_str() {
            PROVISION => required.push((keys::SSH_PUBLIC_KEY.to_string(), triggers)),
            DEPLOY => {
                required.push((keys::SSH_PRIVATE_KEY.to_string(), triggers.clone()));
                for key in &config.deploy.env_keys {
                    required.push((key.clone(), triggers.clone()));
                }
            }
            _ => {}
        }
    }

    let prepare = Stage::new(
        prepare_id,
        Arc::new(PrepareStage::new(
            config.secrets.clone(),
            required,
            CommandsStage::new(&config.prepare, base_dir, slot.clone()),
            slot,
        )),
    );
    stages.insert(0, apply_override(prepare, config));

    Ok(StageGraph::new(stages)?)
}

fn apply_override(mut stage: Stage, config: &Config) -> Stage {
    if let Some(over) = config.pipeline.stages.get(stage.id()) {
        if let Some(ref triggers) = over.triggers {
            stage = stage.triggers(triggers.iter().copied());
        }
        if let Some(timeout) = over.timeout {
            stage = stage.timeout(timeout);
        }
    }
    stage
}
