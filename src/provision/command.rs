// ABOUTME: Cloud provider backed by an external program speaking JSON.
// ABOUTME: Lets a Terraform or cloud-CLI wrapper script act as the infrastructure backend.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::provider::{CloudProvider, ProviderError};
use super::resource::{Dependent, DesiredSpec, ManagedResource};
use crate::types::{IdentityKey, ResourceId};

/// Exit code the program uses for "no such resource".
const EXIT_NOT_FOUND: i32 = 3;
/// Exit code the program uses for "resource still has dependents".
const EXIT_DEPENDENCY_VIOLATION: i32 = 4;

/// Provider that runs `<program> [args...] <verb>` with a JSON request on stdin and
/// reads a JSON response from stdout.
///
/// Verbs: `list`, `dependents`, `release`, `delete`, `describe`, `create`.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandProvider {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: Duration::from_secs(600),
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn invoke<Req, Resp>(&self, verb: &str, request: &Req) -> Result<Resp, ProviderError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let stdout = self.run(verb, request).await?;
        serde_json::from_slice(&stdout)
            .map_err(|e| ProviderError::InvalidResponse(format!("{verb}: {e}")))
    }

    /// Run a verb whose only result is its exit status. Output, if any, must still be JSON.
    async fn invoke_unit<Req>(&self, verb: &str, request: &Req) -> Result<(), ProviderError>
    where
        Req: Serialize + ?Sized,
    {
        let stdout = self.run(verb, request).await?;
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        serde_json::from_slice::<serde_json::Value>(&stdout)
            .map(|_| ())
            .map_err(|e| ProviderError::InvalidResponse(format!("{verb}: {e}")))
    }

    async fn run<Req>(&self, verb: &str, request: &Req) -> Result<Vec<u8>, ProviderError>
    where
        Req: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(request)
            .map_err(|e| ProviderError::Rejected(format!("cannot encode {verb} request: {e}")))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(verb)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(program = %self.program.display(), verb, "invoking provider");

        let mut child = command.spawn().map_err(|e| {
            ProviderError::Unavailable(format!("failed to run {}: {e}", self.program.display()))
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            // A program that ignores its request may exit before reading it.
            match stdin.write_all(&payload).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(ProviderError::Unavailable(format!(
                        "failed to write request: {e}"
                    )));
                }
                _ => {}
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ProviderError::Unavailable(format!("{verb} timed out after {:?}", self.timeout))
            })?
            .map_err(|e| ProviderError::Unavailable(format!("{verb} failed to complete: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(0) => {}
            Some(EXIT_NOT_FOUND) => return Err(ProviderError::NotFound(stderr)),
            Some(EXIT_DEPENDENCY_VIOLATION) => {
                return Err(ProviderError::DependencyViolation(stderr));
            }
            code => {
                return Err(ProviderError::Rejected(format!(
                    "{verb} exited with {code:?}: {stderr}"
                )));
            }
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl CloudProvider for CommandProvider {
    async fn list(&self, identity: &IdentityKey) -> Result<Vec<ManagedResource>, ProviderError> {
        self.invoke("list", identity).await
    }

    async fn dependents(&self, id: &ResourceId) -> Result<Vec<Dependent>, ProviderError> {
        self.invoke("dependents", &json!({ "id": id })).await
    }

    async fn release(
        &self,
        owner: &ResourceId,
        dependent: &Dependent,
    ) -> Result<(), ProviderError> {
        self.invoke_unit("release", &json!({ "id": owner, "dependent": dependent }))
            .await
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), ProviderError> {
        self.invoke_unit("delete", &json!({ "id": id })).await
    }

    async fn describe(&self, id: &ResourceId) -> Result<Option<ManagedResource>, ProviderError> {
        match self.invoke("describe", &json!({ "id": id })).await {
            Err(ProviderError::NotFound(_)) => Ok(None),
            other => other,
        }
    }

    async fn create(
        &self,
        identity: &IdentityKey,
        spec: &DesiredSpec,
    ) -> Result<ManagedResource, ProviderError> {
        self.invoke(
            "create",
            &json!({
                "kind": identity.kind,
                "name": identity.name,
                "attributes": spec.attributes,
                "tags": spec.tags,
            }),
        )
        .await
    }
}
