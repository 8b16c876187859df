// ABOUTME: Compile-fail test verifying create cannot be called before the identity is cleared.
// ABOUTME: This test should fail to compile, validating state machine safety.

use shipyard::provision::{CloudProvider, DesiredSpec, Provisioning};
use shipyard::types::{IdentityKey, LogicalName, ResourceKind};

async fn try_create_without_clear(provider: &dyn CloudProvider) {
    let identity = IdentityKey::new(ResourceKind::Instance, LogicalName::new("todo").unwrap());
    let provisioning = Provisioning::new(identity, DesiredSpec::new());

    // ERROR: create() method doesn't exist on Provisioning<Initialized>
    let _ = provisioning.create(provider).await;
}

fn main() {}
