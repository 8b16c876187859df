// ABOUTME: In-memory cloud provider with scripted boot and deletion delays.
// ABOUTME: Records every deletion so tests can assert the clean-slate guarantee.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shipyard::provision::{
    CloudProvider, Dependent, DependentKind, DesiredSpec, ManagedResource, ProviderError,
    ResourceState,
};
use shipyard::types::{DependentId, IdentityKey, ResourceId};

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<String, Entry>,
    next_id: u32,
    deleted: Vec<ResourceId>,
    created: Vec<(IdentityKey, DesiredSpec)>,
}

#[derive(Debug)]
struct Entry {
    resource: ManagedResource,
    dependents: Vec<Dependent>,
    /// `describe` calls left before a pending resource starts running.
    boot_polls: u32,
    /// `describe` calls left before a deleted resource disappears.
    gone_polls: Option<u32>,
}

/// Cloud provider backed by a map. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct FakeCloud {
    state: Arc<Mutex<State>>,
    address: String,
    boot_polls: u32,
    delete_polls: u32,
    never_ready: bool,
    fail_create: bool,
    sticky_dependents: bool,
    delete_calls: Arc<Mutex<u32>>,
}

impl FakeCloud {
    /// New resources come up on `address` after one pending `describe`.
    pub fn new(address: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            address: address.to_string(),
            boot_polls: 1,
            delete_polls: 1,
            never_ready: false,
            fail_create: false,
            sticky_dependents: false,
            delete_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn boot_polls(mut self, polls: u32) -> Self {
        self.boot_polls = polls;
        self
    }

    /// Created resources stay pending forever.
    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// `release` reports success but leaves dependents attached.
    pub fn sticky_dependents(mut self) -> Self {
        self.sticky_dependents = true;
        self
    }

    pub fn fail_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Add a running resource under `identity` with an attached address reservation.
    pub fn seed(&self, identity: &IdentityKey, address: &str) -> ResourceId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = ResourceId::new(format!("i-old{:03}", state.next_id));
        let dependent = Dependent {
            id: DependentId::new(format!("eipassoc-{:03}", state.next_id)),
            kind: DependentKind::AddressReservation,
        };
        state.resources.insert(
            id.as_str().to_string(),
            Entry {
                resource: ManagedResource {
                    id: id.clone(),
                    identity: identity.clone(),
                    state: ResourceState::Running,
                    address: Some(address.to_string()),
                    tags: BTreeMap::new(),
                },
                dependents: vec![dependent],
                boot_polls: 0,
                gone_polls: None,
            },
        );
        id
    }

    /// Resources under `identity` that have not been deleted.
    pub fn live(&self, identity: &IdentityKey) -> Vec<ManagedResource> {
        self.state
            .lock()
            .resources
            .values()
            .filter(|e| &e.resource.identity == identity && e.gone_polls.is_none())
            .map(|e| e.resource.clone())
            .collect()
    }

    pub fn deleted(&self) -> Vec<ResourceId> {
        self.state.lock().deleted.clone()
    }

    /// Every `delete` request, including rejected ones.
    pub fn delete_calls(&self) -> u32 {
        *self.delete_calls.lock()
    }

    pub fn created(&self) -> Vec<(IdentityKey, DesiredSpec)> {
        self.state.lock().created.clone()
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    async fn list(&self, identity: &IdentityKey) -> Result<Vec<ManagedResource>, ProviderError> {
        Ok(self
            .state
            .lock()
            .resources
            .values()
            .filter(|e| &e.resource.identity == identity)
            .map(|e| e.resource.clone())
            .collect())
    }

    async fn dependents(&self, id: &ResourceId) -> Result<Vec<Dependent>, ProviderError> {
        let state = self.state.lock();
        let entry = state
            .resources
            .get(id.as_str())
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        Ok(entry.dependents.clone())
    }

    async fn release(&self, owner: &ResourceId, dependent: &Dependent) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        let entry = state
            .resources
            .get_mut(owner.as_str())
            .ok_or_else(|| ProviderError::NotFound(owner.to_string()))?;
        if !self.sticky_dependents {
            entry.dependents.retain(|d| d.id != dependent.id);
        }
        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), ProviderError> {
        *self.delete_calls.lock() += 1;
        let mut state = self.state.lock();
        let entry = state
            .resources
            .get_mut(id.as_str())
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        if !entry.dependents.is_empty() {
            return Err(ProviderError::DependencyViolation(id.to_string()));
        }
        entry.resource.state = ResourceState::ShuttingDown;
        entry.gone_polls = Some(self.delete_polls);
        state.deleted.push(id.clone());
        Ok(())
    }

    async fn describe(&self, id: &ResourceId) -> Result<Option<ManagedResource>, ProviderError> {
        let mut state = self.state.lock();
        let Some(entry) = state.resources.get_mut(id.as_str()) else {
            return Ok(None);
        };

        if let Some(polls) = entry.gone_polls {
            if polls == 0 {
                state.resources.remove(id.as_str());
                return Ok(None);
            }
            entry.gone_polls = Some(polls - 1);
            return Ok(Some(entry.resource.clone()));
        }

        if entry.resource.state == ResourceState::Pending && !self.never_ready {
            if entry.boot_polls == 0 {
                entry.resource.state = ResourceState::Running;
                entry.resource.address = Some(self.address.clone());
            } else {
                entry.boot_polls -= 1;
            }
        }
        Ok(Some(entry.resource.clone()))
    }

    async fn create(
        &self,
        identity: &IdentityKey,
        spec: &DesiredSpec,
    ) -> Result<ManagedResource, ProviderError> {
        if self.fail_create {
            return Err(ProviderError::Rejected("capacity unavailable".to_string()));
        }
        let mut state = self.state.lock();
        state.next_id += 1;
        let resource = ManagedResource {
            id: ResourceId::new(format!("i-{:06}", state.next_id)),
            identity: identity.clone(),
            state: ResourceState::Pending,
            address: None,
            tags: spec.tags.clone(),
        };
        state.resources.insert(
            resource.id.as_str().to_string(),
            Entry {
                resource: resource.clone(),
                dependents: Vec::new(),
                boot_polls: self.boot_polls,
                gone_polls: None,
            },
        );
        state.created.push((identity.clone(), spec.clone()));
        Ok(resource)
    }
}
