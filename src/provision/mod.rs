// ABOUTME: Idempotent create-or-replace provisioning of named cloud resources.
// ABOUTME: Enforces the clean-slate invariant through a type-state machine.

mod command;
mod error;
mod machine;
mod provider;
mod provisioner;
mod reachability;
mod resource;
mod state;

pub use command::CommandProvider;
pub use error::{ProvisionError, ProvisionErrorKind};
pub use machine::{Provisioning, TransitionResult};
pub use provider::{CloudProvider, ProviderError};
pub use provisioner::{ProvisionSettings, ResourceProvisioner};
pub use reachability::{Reachability, TcpReachability};
pub use resource::{Dependent, DependentKind, DesiredSpec, ManagedResource, ResourceState};
pub use state::{Cleared, Created, Initialized, Ready};
