// ABOUTME: Seam to the infrastructure collaborator that owns real cloud resources.
// ABOUTME: The provisioner only ever talks to a provider through this trait.

use super::resource::{Dependent, DesiredSpec, ManagedResource};
use crate::types::{IdentityKey, ResourceId};
use async_trait::async_trait;

/// Operations the provisioner needs from an infrastructure backend.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// All resources (in any state) tagged with the identity.
    async fn list(&self, identity: &IdentityKey) -> Result<Vec<ManagedResource>, ProviderError>;

    /// Sub-resources currently bound to a resource.
    async fn dependents(&self, id: &ResourceId) -> Result<Vec<Dependent>, ProviderError>;

    /// Detach and release one dependent.
    async fn release(&self, owner: &ResourceId, dependent: &Dependent)
    -> Result<(), ProviderError>;

    /// Request deletion. Completion is observed through `describe`.
    async fn delete(&self, id: &ResourceId) -> Result<(), ProviderError>;

    /// Current view of a resource; `None` once it is gone.
    async fn describe(&self, id: &ResourceId) -> Result<Option<ManagedResource>, ProviderError>;

    /// Create a resource tagged with the identity.
    async fn create(
        &self,
        identity: &IdentityKey,
        spec: &DesiredSpec,
    ) -> Result<ManagedResource, ProviderError>;
}

/// Errors reported by a provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("resource still has live dependents: {0}")]
    DependencyViolation(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}
