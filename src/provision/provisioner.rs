// ABOUTME: Create-or-replace driver over the provisioning state machine.
// ABOUTME: Guarantees at most one live resource per identity, or none on failure.

use std::sync::Arc;

use serde::Deserialize;

use super::error::ProvisionError;
use super::machine::{Provisioning, clear_identity};
use super::provider::CloudProvider;
use super::reachability::Reachability;
use super::resource::{DesiredSpec, ManagedResource};
use crate::poll::{CancellationToken, PollSettings, ReadinessPoller};
use crate::types::{IdentityKey, ResourceId};

/// Poll budgets for deletion confirmation and readiness.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProvisionSettings {
    pub deletion: PollSettings,
    pub readiness: PollSettings,
}

/// Idempotent provisioner for named resources.
pub struct ResourceProvisioner {
    provider: Arc<dyn CloudProvider>,
    settings: ProvisionSettings,
    cancel: CancellationToken,
    reachability: Option<Arc<dyn Reachability>>,
}

impl std::fmt::Debug for ResourceProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProvisioner")
            .field("settings", &self.settings)
            .field("reachability", &self.reachability.is_some())
            .finish()
    }
}

impl ResourceProvisioner {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        settings: ProvisionSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            settings,
            cancel,
            reachability: None,
        }
    }

    /// Require the reachability check to pass before a resource counts as ready.
    pub fn with_reachability(mut self, check: Arc<dyn Reachability>) -> Self {
        self.reachability = Some(check);
        self
    }

    fn deletion_poller(&self) -> ReadinessPoller {
        ReadinessPoller::new(self.settings.deletion, self.cancel.clone())
    }

    /// Cleanup must run to completion even after the run was cancelled.
    fn cleanup_poller(&self) -> ReadinessPoller {
        ReadinessPoller::new(self.settings.deletion, CancellationToken::new())
    }

    /// Tear down anything under `identity`, then create and await a fresh resource.
    ///
    /// On success exactly one live resource exists under the identity. On failure after
    /// creation began, whatever was created is removed again; if that removal fails
    /// too the error is `Partial`.
    pub async fn provision(
        &self,
        identity: &IdentityKey,
        spec: &DesiredSpec,
    ) -> Result<ManagedResource, ProvisionError> {
        let provider = self.provider.as_ref();
        let deletion = self.deletion_poller();

        let cleared = Provisioning::new(identity.clone(), spec.clone())
            .clear(provider, &deletion)
            .await?;
        if !cleared.removed().is_empty() {
            tracing::info!(
                identity = %identity,
                removed = cleared.removed().len(),
                "clean slate established"
            );
        }

        let created = match cleared.create(provider).await {
            Ok(created) => created,
            Err(failure) => return Err(self.sweep_after(identity, failure).await),
        };

        let readiness = ReadinessPoller::new(self.settings.readiness, self.cancel.clone());
        match created
            .await_ready(provider, &readiness, self.reachability.as_deref())
            .await
        {
            Ok(ready) => Ok(ready.finish()),
            Err((created, failure)) => {
                tracing::warn!(
                    identity = %identity,
                    resource = %created.resource().id,
                    error = %failure,
                    "discarding resource that never became ready"
                );
                match created.discard(provider, &self.cleanup_poller()).await {
                    Ok(_) => Err(failure),
                    Err(cleanup) => Err(ProvisionError::Partial {
                        identity: identity.clone(),
                        failure: Box::new(failure),
                        cleanup: Box::new(cleanup),
                    }),
                }
            }
        }
    }

    /// Remove everything under `identity` without creating a replacement.
    pub async fn teardown(&self, identity: &IdentityKey) -> Result<Vec<ResourceId>, ProvisionError> {
        clear_identity(self.provider.as_ref(), &self.deletion_poller(), identity).await
    }

    /// A failed create may still have left something behind; remove it.
    async fn sweep_after(&self, identity: &IdentityKey, failure: ProvisionError) -> ProvisionError {
        match clear_identity(self.provider.as_ref(), &self.cleanup_poller(), identity).await {
            Ok(swept) => {
                if !swept.is_empty() {
                    tracing::warn!(identity = %identity, swept = swept.len(), "removed resources left by failed create");
                }
                failure
            }
            Err(cleanup) => ProvisionError::Partial {
                identity: identity.clone(),
                failure: Box::new(failure),
                cleanup: Box::new(cleanup),
            },
        }
    }
}
