// ABOUTME: Provision stage: replaces the application's instance and publishes its address.
// ABOUTME: Publishes provision.address and provision.instance_id for deploy and verify.

use std::sync::Arc;

use async_trait::async_trait;

use super::commands::SecretSlot;
use super::resolved;
use crate::config::ProvisionConfig;
use crate::pipeline::{StageContext, StageError, StageRunner};
use crate::provision::{
    CloudProvider, DesiredSpec, ProvisionSettings, Reachability, ResourceProvisioner,
};
use crate::secrets::keys;
use crate::types::{IdentityKey, LogicalName, ResourceKind};

pub struct ProvisionStage {
    identity: IdentityKey,
    instance_type: String,
    attributes: Vec<(String, String)>,
    settings: ProvisionSettings,
    provider: Arc<dyn CloudProvider>,
    reachability: Option<Arc<dyn Reachability>>,
    secrets: SecretSlot,
}

impl std::fmt::Debug for ProvisionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionStage")
            .field("identity", &self.identity)
            .field("instance_type", &self.instance_type)
            .field("settings", &self.settings)
            .finish()
    }
}

impl ProvisionStage {
    pub fn new(
        app: LogicalName,
        config: &ProvisionConfig,
        provider: Arc<dyn CloudProvider>,
        reachability: Option<Arc<dyn Reachability>>,
        secrets: SecretSlot,
    ) -> Self {
        Self {
            identity: IdentityKey::new(ResourceKind::Instance, app),
            instance_type: config.instance_type.clone(),
            attributes: config
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            settings: ProvisionSettings {
                deletion: config.deletion,
                readiness: config.readiness,
            },
            provider,
            reachability,
            secrets,
        }
    }

    fn desired_spec(&self, public_key: &str) -> DesiredSpec {
        let mut spec = DesiredSpec::new();
        for (key, value) in &self.attributes {
            spec = spec.attribute(key, value);
        }
        spec.attribute("instance_type", &self.instance_type)
            .attribute("app_name", self.identity.name.as_str())
            .attribute("ssh_public_key", public_key)
            .tag("managed-by", "shipyard")
    }
}

#[async_trait]
impl StageRunner for ProvisionStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageError> {
        let secrets = resolved(&self.secrets)?;
        let public_key = secrets.require(keys::SSH_PUBLIC_KEY)?;
        let spec = self.desired_spec(public_key.expose());

        let mut provisioner = ResourceProvisioner::new(
            Arc::clone(&self.provider),
            self.settings,
            ctx.cancel_token().clone(),
        );
        if let Some(ref check) = self.reachability {
            provisioner = provisioner.with_reachability(Arc::clone(check));
        }

        let resource = provisioner.provision(&self.identity, &spec).await?;
        let address = resource.reachable_address().ok_or_else(|| {
            StageError::Config(format!(
                "{} is ready but reports no address",
                resource.id
            ))
        })?;

        tracing::info!(
            identity = %self.identity,
            instance = %resource.id,
            address,
            "instance provisioned"
        );
        ctx.publish("address", address)?;
        ctx.publish("instance_id", resource.id.as_str())
    }
}
