// ABOUTME: Data model for managed resources, their dependents and desired specs.
// ABOUTME: Serializable so the command provider can exchange them as JSON.

use crate::types::{DependentId, IdentityKey, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl ResourceState {
    /// Anything short of terminated still occupies the identity.
    pub fn is_live(&self) -> bool {
        !matches!(self, ResourceState::Terminated)
    }
}

/// A concrete instantiation of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedResource {
    pub id: ResourceId,
    pub identity: IdentityKey,
    pub state: ResourceState,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ManagedResource {
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// Address to use once the resource is running and has one assigned.
    pub fn reachable_address(&self) -> Option<&str> {
        match self.state {
            ResourceState::Running => self.address.as_deref().filter(|a| !a.is_empty()),
            _ => None,
        }
    }
}

/// Kind of sub-resource bound to a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependentKind {
    AddressReservation,
    NetworkInterface,
    Volume,
}

/// A sub-resource that must be released before its owner can be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependent {
    pub id: DependentId,
    pub kind: DependentKind,
}

/// What to create. Attribute keys are provider-defined; the standard release uses
/// `instance_type`, `app_name` and `ssh_public_key`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredSpec {
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl DesiredSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}
