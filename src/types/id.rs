// ABOUTME: Phantom-typed identifiers for compile-time type safety.
// ABOUTME: Keeps cloud resource ids, dependent ids and run ids from being mixed up.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types for phantom type parameters.
/// Empty enums cannot be instantiated and need no trait bounds.
pub enum ResourceMarker {}
pub enum DependentMarker {}
pub enum RunMarker {}

/// A type-safe identifier.
///
/// The phantom parameter makes it impossible to pass a `DependentId` (an address
/// reservation, a network interface) where the `ResourceId` of the resource that
/// owns it is expected.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// T is only a marker, so these impls must not require T: Trait.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

pub type ResourceId = Id<ResourceMarker>;
pub type DependentId = Id<DependentMarker>;
pub type RunId = Id<RunMarker>;

impl RunId {
    /// Generate a run id from the current time and process id.
    pub fn generate() -> Self {
        let now = chrono::Utc::now();
        Self::new(format!(
            "{}-{}",
            now.format("%Y%m%dT%H%M%S%3f"),
            std::process::id()
        ))
    }
}
