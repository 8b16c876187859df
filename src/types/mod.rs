// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-typed ids, resource identities, stage ids and image references.

mod id;
mod identity;
mod image_ref;
mod label;

pub use id::{DependentId, Id, ResourceId, RunId};
pub use identity::{IdentityKey, ResourceKind};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use label::{LabelError, LogicalName, StageId};
