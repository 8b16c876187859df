// ABOUTME: Compile-fail test verifying ResourceId and DependentId are not interchangeable.
// ABOUTME: This test should fail to compile, validating type safety.

use shipyard::types::{DependentId, ResourceId};

fn delete_instance(_id: ResourceId) {}

fn main() {
    let association = DependentId::new("eipassoc-0a1b2c3d");
    delete_instance(association); // ERROR: expected ResourceId, found DependentId
}
