// ABOUTME: Integration tests for the program-backed cloud provider.
// ABOUTME: Runs small shell scripts that speak the JSON verb protocol.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use shipyard::provision::{
    CloudProvider, CommandProvider, Dependent, DependentKind, DesiredSpec, ProviderError,
    ResourceState,
};
use shipyard::types::{DependentId, IdentityKey, LogicalName, ResourceId, ResourceKind};
use tempfile::TempDir;

/// A provider script that records each request next to itself and answers every verb.
const WELL_BEHAVED: &str = r#"#!/bin/sh
cat > "$(dirname "$0")/request-$1.json"
case "$1" in
  list) echo '[{"id":"i-001","identity":{"kind":"instance","name":"todo"},"state":"running","address":"203.0.113.10"}]' ;;
  dependents) echo '[{"id":"eipassoc-001","kind":"address-reservation"}]' ;;
  release|delete) ;;
  describe) echo 'no such instance' >&2; exit 3 ;;
  create) echo '{"id":"i-002","identity":{"kind":"instance","name":"todo"},"state":"pending"}' ;;
esac
"#;

fn create_provider(dir: &TempDir, script: &str) -> CommandProvider {
    let path = dir.path().join("provider");
    fs::write(&path, script).unwrap();

    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();

    CommandProvider::new(path).timeout(Duration::from_secs(10))
}

fn request(dir: &TempDir, verb: &str) -> serde_json::Value {
    let raw = fs::read_to_string(dir.path().join(format!("request-{verb}.json"))).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn identity() -> IdentityKey {
    IdentityKey::new(ResourceKind::Instance, LogicalName::new("todo").unwrap())
}

fn address_reservation() -> Dependent {
    Dependent {
        id: DependentId::new("eipassoc-001"),
        kind: DependentKind::AddressReservation,
    }
}

#[tokio::test]
async fn list_and_dependents_parse_the_response() {
    let dir = TempDir::new().unwrap();
    let provider = create_provider(&dir, WELL_BEHAVED);

    let resources = provider.list(&identity()).await.unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].id, ResourceId::new("i-001"));
    assert_eq!(resources[0].reachable_address(), Some("203.0.113.10"));
    assert_eq!(request(&dir, "list")["name"], "todo");

    let dependents = provider.dependents(&ResourceId::new("i-001")).await.unwrap();
    assert_eq!(dependents, vec![address_reservation()]);
    assert_eq!(request(&dir, "dependents")["id"], "i-001");
}

#[tokio::test]
async fn release_and_delete_accept_empty_output() {
    let dir = TempDir::new().unwrap();
    let provider = create_provider(&dir, WELL_BEHAVED);
    let owner = ResourceId::new("i-001");

    provider.release(&owner, &address_reservation()).await.unwrap();
    provider.delete(&owner).await.unwrap();

    let release = request(&dir, "release");
    assert_eq!(release["id"], "i-001");
    assert_eq!(release["dependent"]["kind"], "address-reservation");
    assert_eq!(request(&dir, "delete")["id"], "i-001");
}

#[tokio::test]
async fn delete_without_reading_the_request_still_succeeds() {
    let dir = TempDir::new().unwrap();
    let provider = create_provider(&dir, "#!/bin/sh\nexit 0\n");

    provider.delete(&ResourceId::new("i-001")).await.unwrap();
}

#[tokio::test]
async fn create_sends_the_spec_and_returns_the_resource() {
    let dir = TempDir::new().unwrap();
    let provider = create_provider(&dir, WELL_BEHAVED);
    let spec = DesiredSpec::new()
        .attribute("instance_type", "t3.small")
        .tag("shipyard.instance", "todo");

    let created = provider.create(&identity(), &spec).await.unwrap();

    assert_eq!(created.id, ResourceId::new("i-002"));
    assert_eq!(created.state, ResourceState::Pending);
    assert!(created.address.is_none());
    let sent = request(&dir, "create");
    assert_eq!(sent["kind"], "instance");
    assert_eq!(sent["attributes"]["instance_type"], "t3.small");
    assert_eq!(sent["tags"]["shipyard.instance"], "todo");
}

#[tokio::test]
async fn describe_of_a_missing_resource_is_none() {
    let dir = TempDir::new().unwrap();
    let provider = create_provider(&dir, WELL_BEHAVED);

    let described = provider.describe(&ResourceId::new("i-404")).await.unwrap();
    assert!(described.is_none());
}

#[tokio::test]
async fn exit_codes_map_to_provider_errors() {
    let dir = TempDir::new().unwrap();
    let provider = create_provider(
        &dir,
        r#"#!/bin/sh
cat >/dev/null
case "$1" in
  release) echo 'i-001 not found' >&2; exit 3 ;;
  delete) echo 'eipassoc-001 still attached' >&2; exit 4 ;;
  *) echo 'quota exceeded' >&2; exit 1 ;;
esac
"#,
    );
    let owner = ResourceId::new("i-001");

    let err = provider
        .release(&owner, &address_reservation())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(ref msg) if msg == "i-001 not found"));

    let err = provider.delete(&owner).await.unwrap_err();
    assert!(
        matches!(err, ProviderError::DependencyViolation(ref msg) if msg == "eipassoc-001 still attached")
    );

    let err = provider
        .create(&identity(), &DesiredSpec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Rejected(_)));
    assert!(err.to_string().contains("quota exceeded"), "{err}");
}

#[tokio::test]
async fn invalid_json_is_reported() {
    let dir = TempDir::new().unwrap();
    let provider = create_provider(&dir, "#!/bin/sh\ncat >/dev/null\necho 'not json'\n");

    let err = provider.list(&identity()).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(ref msg) if msg.starts_with("list: ")));

    let err = provider.delete(&ResourceId::new("i-001")).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn slow_program_times_out() {
    let dir = TempDir::new().unwrap();
    let provider = create_provider(&dir, "#!/bin/sh\ncat >/dev/null\nsleep 10\n")
        .timeout(Duration::from_millis(300));

    let err = provider.list(&identity()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
    assert!(err.to_string().contains("list timed out"), "{err}");
}

#[tokio::test]
async fn missing_program_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let provider = CommandProvider::new(dir.path().join("does-not-exist"));

    let err = provider.list(&identity()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(ref msg) if msg.starts_with("failed to run")));
}
