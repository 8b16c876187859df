// ABOUTME: Compile-fail test verifying a ready resource cannot be discarded through the machine.
// ABOUTME: This test should fail to compile, validating state machine safety.

use shipyard::poll::ReadinessPoller;
use shipyard::provision::{CloudProvider, Provisioning, Ready};

async fn try_discard_ready(
    provisioning: Provisioning<Ready>,
    provider: &dyn CloudProvider,
    deletion: &ReadinessPoller,
) {
    // ERROR: discard() method doesn't exist on Provisioning<Ready>
    let _ = provisioning.discard(provider, deletion).await;
}

fn main() {}
