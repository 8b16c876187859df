// ABOUTME: Provisioning state markers for the type state pattern.
// ABOUTME: States carry their own data so a created resource cannot be forgotten.

use super::resource::ManagedResource;

/// Nothing touched yet.
/// Available actions: `clear()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Every prior resource under the identity is confirmed gone.
/// Available actions: `create()`
#[derive(Debug, Clone, Default)]
pub struct Cleared;

/// A new resource exists but has not proven reachable.
/// Available actions: `await_ready()`, `discard()`
#[derive(Debug, Clone)]
pub struct Created {
    pub(crate) resource: ManagedResource,
}

/// The new resource is running and reachable.
/// Available actions: `finish()`
#[derive(Debug, Clone)]
pub struct Ready {
    pub(crate) resource: ManagedResource,
}
