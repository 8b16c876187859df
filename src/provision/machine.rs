// ABOUTME: State transitions for clean-slate provisioning.
// ABOUTME: Each method consumes self and returns the next state on success.

use snafu::ResultExt;

use super::error::{
    CreateSnafu, DeleteSnafu, DeletionUnconfirmedSnafu, DependentsSnafu, ListSnafu,
    LiveDependentsSnafu, ProvisionError, ReleaseSnafu,
};
use super::provider::{CloudProvider, ProviderError};
use super::reachability::Reachability;
use super::resource::{DesiredSpec, ManagedResource};
use super::state::{Cleared, Created, Initialized, Ready};
use crate::poll::ReadinessPoller;
use crate::types::{IdentityKey, ResourceId};

/// Result type for transitions that hand the previous state back on failure so the
/// caller can clean up.
pub type TransitionResult<T, S> = Result<Provisioning<T>, (Provisioning<S>, ProvisionError)>;

/// One provisioning attempt for an identity, parameterized by its current state.
#[derive(Debug)]
pub struct Provisioning<S> {
    pub(crate) identity: IdentityKey,
    pub(crate) spec: DesiredSpec,
    pub(crate) removed: Vec<ResourceId>,
    pub(crate) state: S,
}

impl<S> Provisioning<S> {
    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    /// Resources deleted while clearing the identity.
    pub fn removed(&self) -> &[ResourceId] {
        &self.removed
    }

    fn transition<T>(self, state: T) -> Provisioning<T> {
        Provisioning {
            identity: self.identity,
            spec: self.spec,
            removed: self.removed,
            state,
        }
    }
}

// =============================================================================
// Initialized -> Cleared
// =============================================================================

impl Provisioning<Initialized> {
    pub fn new(identity: IdentityKey, spec: DesiredSpec) -> Self {
        Provisioning {
            identity,
            spec,
            removed: Vec::new(),
            state: Initialized,
        }
    }

    /// Delete every resource currently tagged with the identity.
    ///
    /// # Errors
    ///
    /// Fails if any resource cannot be listed, released, deleted, or confirmed gone.
    #[must_use = "provisioning state must be used"]
    pub async fn clear(
        mut self,
        provider: &dyn CloudProvider,
        deletion: &ReadinessPoller,
    ) -> Result<Provisioning<Cleared>, ProvisionError> {
        self.removed = clear_identity(provider, deletion, &self.identity).await?;
        Ok(self.transition(Cleared))
    }
}

// =============================================================================
// Cleared -> Created
// =============================================================================

impl Provisioning<Cleared> {
    /// Create the new resource under the identity.
    #[must_use = "provisioning state must be used"]
    pub async fn create(
        self,
        provider: &dyn CloudProvider,
    ) -> Result<Provisioning<Created>, ProvisionError> {
        let (tag_key, tag_value) = self.identity.tag();
        let spec = self.spec.clone().tag(tag_key, tag_value);

        let resource = provider
            .create(&self.identity, &spec)
            .await
            .context(CreateSnafu {
                identity: self.identity.clone(),
            })?;

        tracing::info!(identity = %self.identity, resource = %resource.id, "resource created");
        Ok(self.transition(Created { resource }))
    }
}

// =============================================================================
// Created -> Ready
// =============================================================================

impl Provisioning<Created> {
    pub fn resource(&self) -> &ManagedResource {
        &self.state.resource
    }

    /// Poll until the resource runs, has an address, and passes the reachability check.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` when the budget runs out so the caller can discard.
    #[must_use = "provisioning state must be used"]
    pub async fn await_ready(
        self,
        provider: &dyn CloudProvider,
        readiness: &ReadinessPoller,
        reachability: Option<&dyn Reachability>,
    ) -> TransitionResult<Ready, Created> {
        let id = self.state.resource.id.clone();
        let probe_name = format!("{} readiness", self.identity);

        let polled = readiness
            .poll_for(&probe_name, || {
                let id = id.clone();
                async move {
                    let current = provider
                        .describe(&id)
                        .await
                        .map_err(|e| e.to_string())?
                        .ok_or_else(|| format!("{id} disappeared while waiting"))?;

                    let Some(address) = current.reachable_address() else {
                        return Ok(None);
                    };
                    if let Some(check) = reachability
                        && !check.check(address).await.map_err(|e| e.to_string())?
                    {
                        return Ok(None);
                    }
                    Ok::<_, String>(Some(current))
                }
            })
            .await;

        match polled.value {
            Some(resource) => {
                tracing::info!(
                    identity = %self.identity,
                    resource = %resource.id,
                    attempts = polled.result.attempts,
                    "resource reachable"
                );
                Ok(self.transition(Ready { resource }))
            }
            None if polled.result.is_cancelled() => Err((self, ProvisionError::Cancelled)),
            None => Err((
                self,
                ProvisionError::NotReady {
                    resource: id,
                    result: polled.result,
                },
            )),
        }
    }

    /// Delete the created resource, returning to a cleared identity.
    #[must_use = "provisioning state must be used"]
    pub async fn discard(
        self,
        provider: &dyn CloudProvider,
        deletion: &ReadinessPoller,
    ) -> Result<Provisioning<Cleared>, ProvisionError> {
        remove_resource(provider, deletion, &self.state.resource).await?;
        Ok(self.transition(Cleared))
    }
}

// =============================================================================
// Ready - Terminal State
// =============================================================================

impl Provisioning<Ready> {
    pub fn resource(&self) -> &ManagedResource {
        &self.state.resource
    }

    /// Consume the provisioning and return the live resource.
    pub fn finish(self) -> ManagedResource {
        self.state.resource
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Remove every resource tagged with `identity`, returning the ids deleted.
pub(crate) async fn clear_identity(
    provider: &dyn CloudProvider,
    deletion: &ReadinessPoller,
    identity: &IdentityKey,
) -> Result<Vec<ResourceId>, ProvisionError> {
    let existing = provider.list(identity).await.context(ListSnafu {
        identity: identity.clone(),
    })?;

    let mut removed = Vec::new();
    for resource in existing {
        if !resource.is_live() {
            continue;
        }
        tracing::info!(identity = %identity, resource = %resource.id, "removing existing resource");
        remove_resource(provider, deletion, &resource).await?;
        removed.push(resource.id);
    }
    Ok(removed)
}

/// Release dependents, delete, and wait for the provider to confirm absence.
async fn remove_resource(
    provider: &dyn CloudProvider,
    deletion: &ReadinessPoller,
    resource: &ManagedResource,
) -> Result<(), ProvisionError> {
    let id = &resource.id;

    let dependents = provider.dependents(id).await.context(DependentsSnafu {
        resource: id.clone(),
    })?;
    for dependent in &dependents {
        tracing::debug!(resource = %id, dependent = %dependent.id, kind = ?dependent.kind, "releasing dependent");
        provider
            .release(id, dependent)
            .await
            .context(ReleaseSnafu {
                resource: id.clone(),
                dependent: dependent.id.clone(),
            })?;
    }

    let remaining = provider.dependents(id).await.context(DependentsSnafu {
        resource: id.clone(),
    })?;
    if !remaining.is_empty() {
        return LiveDependentsSnafu {
            resource: id.clone(),
            count: remaining.len(),
        }
        .fail();
    }

    match provider.delete(id).await {
        Ok(()) => {}
        // Already gone counts as deleted.
        Err(ProviderError::NotFound(_)) => return Ok(()),
        Err(source) => {
            return Err(source).context(DeleteSnafu {
                resource: id.clone(),
            });
        }
    }

    let result = deletion
        .poll(&format!("{id} absent"), || async move {
            let current = provider.describe(id).await?;
            Ok::<_, ProviderError>(current.is_none_or(|r| !r.is_live()))
        })
        .await;

    if result.is_cancelled() {
        return Err(ProvisionError::Cancelled);
    }
    if !result.success() {
        return DeletionUnconfirmedSnafu {
            resource: id.clone(),
            result,
        }
        .fail();
    }
    Ok(())
}
