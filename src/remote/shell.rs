// ABOUTME: Transport seam for remote execution and its SSH implementation.
// ABOUTME: Tests substitute in-memory connectors and shells.

use std::time::Duration;

use async_trait::async_trait;

use super::executor::RemoteTarget;
use crate::ssh::{self, CommandOutput, Credential, Session, SessionConfig};

/// An open command channel to a remote host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, command: &str, timeout: Duration) -> ssh::Result<CommandOutput>;

    /// Write `contents` to `path` and set its permission bits.
    async fn write_file(
        &self,
        path: &str,
        contents: &[u8],
        mode: u32,
        timeout: Duration,
    ) -> ssh::Result<()>;

    async fn close(self: Box<Self>) -> ssh::Result<()>;
}

/// Opens shells to a target.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        target: &RemoteTarget,
        credential: &Credential,
    ) -> ssh::Result<Box<dyn RemoteShell>>;
}

/// Connector that opens real SSH sessions.
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshConnector {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(15), Duration::from_secs(300))
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        target: &RemoteTarget,
        credential: &Credential,
    ) -> ssh::Result<Box<dyn RemoteShell>> {
        let config = SessionConfig::new(&target.host, &target.user, credential.clone())
            .port(target.port)
            .trust(target.trust.clone())
            .connect_timeout(self.connect_timeout)
            .command_timeout(self.command_timeout);
        let session = Session::connect(config).await?;
        Ok(Box::new(SshShell { session }))
    }
}

struct SshShell {
    session: Session,
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn exec(&self, command: &str, timeout: Duration) -> ssh::Result<CommandOutput> {
        self.session.exec_with_timeout(command, timeout).await
    }

    async fn write_file(
        &self,
        path: &str,
        contents: &[u8],
        mode: u32,
        timeout: Duration,
    ) -> ssh::Result<()> {
        let quoted = shell_quote(path);
        // umask keeps the file private before chmod runs.
        let command = format!("umask 077 && cat > {quoted} && chmod {mode:o} {quoted}");
        let output = self
            .session
            .exec_with_input(&command, contents, timeout)
            .await?;
        if !output.success() {
            return Err(ssh::Error::UploadFailed {
                path: path.to_string(),
                reason: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
            });
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> ssh::Result<()> {
        self.session.disconnect().await
    }
}

/// Quote a string for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '='))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
