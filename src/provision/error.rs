// ABOUTME: Provisioning error types with the SNAFU pattern.
// ABOUTME: Every failure names the identity or resource involved, plus a kind classifier.

use snafu::Snafu;

use super::provider::ProviderError;
use crate::poll::ProbeResult;
use crate::types::{DependentId, IdentityKey, ResourceId};

/// Failure of a provisioning call. All variants are fatal to the calling stage.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProvisionError {
    #[snafu(display("failed to list resources for {identity}: {source}"))]
    List {
        identity: IdentityKey,
        source: ProviderError,
    },

    #[snafu(display("failed to inspect dependents of {resource}: {source}"))]
    Dependents {
        resource: ResourceId,
        source: ProviderError,
    },

    #[snafu(display("failed to release {dependent} from {resource}: {source}"))]
    Release {
        resource: ResourceId,
        dependent: DependentId,
        source: ProviderError,
    },

    #[snafu(display("refusing to delete {resource}: {count} dependent(s) still attached"))]
    LiveDependents { resource: ResourceId, count: usize },

    #[snafu(display("failed to delete {resource}: {source}"))]
    Delete {
        resource: ResourceId,
        source: ProviderError,
    },

    #[snafu(display("deletion of {resource} was not confirmed: {result}"))]
    DeletionUnconfirmed {
        resource: ResourceId,
        result: ProbeResult,
    },

    #[snafu(display("failed to create {identity}: {source}"))]
    Create {
        identity: IdentityKey,
        source: ProviderError,
    },

    #[snafu(display("{resource} did not become reachable: {result}"))]
    NotReady {
        resource: ResourceId,
        result: ProbeResult,
    },

    #[snafu(display(
        "provisioning {identity} failed ({failure}) and cleanup failed too ({cleanup}); \
         resources under this identity may remain"
    ))]
    Partial {
        identity: IdentityKey,
        failure: Box<ProvisionError>,
        cleanup: Box<ProvisionError>,
    },

    #[snafu(display("provisioning cancelled"))]
    Cancelled,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionErrorKind {
    /// The provider refused or failed a request.
    Provider,
    /// A resource could not be deleted because sub-resources remain bound.
    DependencyViolation,
    /// A readiness or deletion poll ran out of attempts.
    BudgetExhausted,
    /// A step failed and the cleanup that followed failed as well.
    Partial,
    /// The run was cancelled mid-provisioning.
    Cancelled,
}

impl ProvisionError {
    pub fn kind(&self) -> ProvisionErrorKind {
        match self {
            ProvisionError::List { .. }
            | ProvisionError::Dependents { .. }
            | ProvisionError::Release { .. }
            | ProvisionError::Create { .. } => ProvisionErrorKind::Provider,
            ProvisionError::Delete {
                source: ProviderError::DependencyViolation(_),
                ..
            }
            | ProvisionError::LiveDependents { .. } => ProvisionErrorKind::DependencyViolation,
            ProvisionError::Delete { .. } => ProvisionErrorKind::Provider,
            ProvisionError::DeletionUnconfirmed { .. } | ProvisionError::NotReady { .. } => {
                ProvisionErrorKind::BudgetExhausted
            }
            ProvisionError::Partial { .. } => ProvisionErrorKind::Partial,
            ProvisionError::Cancelled => ProvisionErrorKind::Cancelled,
        }
    }
}
