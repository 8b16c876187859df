// ABOUTME: Identity keys for managed cloud resources.
// ABOUTME: An identity is (kind, logical name) and outlives any single instantiation.

use super::label::LogicalName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Instance,
    SecurityGroup,
    KeyPair,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instance",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::KeyPair => "key-pair",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (kind, logical name) pair naming a resource independent of its current id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub kind: ResourceKind,
    pub name: LogicalName,
}

impl IdentityKey {
    pub fn new(kind: ResourceKind, name: LogicalName) -> Self {
        Self { kind, name }
    }

    /// Tag key/value pair used to mark resources with this identity.
    pub fn tag(&self) -> (String, String) {
        (
            format!("shipyard.{}", self.kind),
            self.name.as_str().to_string(),
        )
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}
