// ABOUTME: In-memory remote host reached through a fake connector.
// ABOUTME: Records commands and uploaded files; scripted failures per command substring.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shipyard::remote::{Connector, RemoteShell, RemoteTarget};
use shipyard::ssh::{self, CommandOutput, Credential};

/// A file written to the fake host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub contents: Vec<u8>,
    pub mode: u32,
}

#[derive(Debug, Default)]
struct Host {
    connects: u32,
    commands: Vec<String>,
    files: BTreeMap<String, RemoteFile>,
    closed: u32,
}

/// Connector to a single fake host. Cloning shares the host.
#[derive(Debug, Clone)]
pub struct FakeConnector {
    host: Arc<Mutex<Host>>,
    failing_connects: u32,
    compose: Option<&'static str>,
    /// (substring, exit code, stderr) for commands that should fail.
    failures: Vec<(String, u32, String)>,
    hang: Option<String>,
}

impl FakeConnector {
    /// A reachable host with the docker compose plugin installed.
    pub fn new() -> Self {
        Self {
            host: Arc::new(Mutex::new(Host::default())),
            failing_connects: 0,
            compose: Some("docker compose"),
            failures: Vec::new(),
            hang: None,
        }
    }

    /// The first `n` connection attempts are refused.
    pub fn refuse_first(mut self, n: u32) -> Self {
        self.failing_connects = n;
        self
    }

    /// Which compose command answers `version`, if any.
    pub fn compose(mut self, command: Option<&'static str>) -> Self {
        self.compose = command;
        self
    }

    /// Commands containing `needle` exit with `code`.
    pub fn fail_on(mut self, needle: &str, code: u32, stderr: &str) -> Self {
        self.failures
            .push((needle.to_string(), code, stderr.to_string()));
        self
    }

    /// Commands containing `needle` never finish.
    pub fn hang_on(mut self, needle: &str) -> Self {
        self.hang = Some(needle.to_string());
        self
    }

    pub fn connects(&self) -> u32 {
        self.host.lock().connects
    }

    pub fn commands(&self) -> Vec<String> {
        self.host.lock().commands.clone()
    }

    pub fn file(&self, path: &str) -> Option<RemoteFile> {
        self.host.lock().files.get(path).cloned()
    }

    pub fn closed(&self) -> u32 {
        self.host.lock().closed
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        target: &RemoteTarget,
        _credential: &Credential,
    ) -> ssh::Result<Box<dyn RemoteShell>> {
        let mut host = self.host.lock();
        host.connects += 1;
        if host.connects <= self.failing_connects {
            return Err(ssh::Error::Unreachable {
                host: target.host.clone(),
                port: target.port,
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(FakeShell {
            connector: self.clone(),
        }))
    }
}

struct FakeShell {
    connector: FakeConnector,
}

impl FakeShell {
    fn respond(&self, command: &str) -> CommandOutput {
        let ok = CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        };

        if command.contains(" version") {
            let installed = self
                .connector
                .compose
                .is_some_and(|tool| command.starts_with(&format!("{tool} version")));
            return CommandOutput {
                exit_code: if installed { 0 } else { 127 },
                ..ok
            };
        }

        if let Some(path) = command.strip_prefix("test -s ") {
            let path = path.trim_matches('\'');
            let present = self
                .connector
                .host
                .lock()
                .files
                .get(path)
                .is_some_and(|f| !f.contents.is_empty());
            return CommandOutput {
                exit_code: if present { 0 } else { 1 },
                ..ok
            };
        }

        for (needle, code, stderr) in &self.connector.failures {
            if command.contains(needle.as_str()) {
                return CommandOutput {
                    exit_code: *code,
                    stdout: String::new(),
                    stderr: stderr.clone(),
                };
            }
        }
        ok
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn exec(&self, command: &str, timeout: Duration) -> ssh::Result<CommandOutput> {
        self.connector.host.lock().commands.push(command.to_string());
        if let Some(ref needle) = self.connector.hang
            && command.contains(needle.as_str())
        {
            tokio::time::sleep(timeout).await;
            return Err(ssh::Error::CommandTimeout(timeout));
        }
        Ok(self.respond(command))
    }

    async fn write_file(
        &self,
        path: &str,
        contents: &[u8],
        mode: u32,
        _timeout: Duration,
    ) -> ssh::Result<()> {
        self.connector.host.lock().files.insert(
            path.to_string(),
            RemoteFile {
                contents: contents.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    async fn close(self: Box<Self>) -> ssh::Result<()> {
        self.connector.host.lock().closed += 1;
        Ok(())
    }
}
