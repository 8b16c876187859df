// ABOUTME: SSH session management using russh.
// ABOUTME: Handles host trust, key authentication, and command execution with optional stdin.

use super::error::{Error, Result};
use crate::secrets::Secret;
use russh::client::{self, Config, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How the remote host key is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostTrust {
    /// Accept only a host key with this SHA256 fingerprint (`SHA256:<base64>`).
    Pinned(String),
    /// Require the key to be present in known_hosts.
    KnownHosts { path: Option<PathBuf> },
    /// Accept and record unknown keys; a changed key is still rejected.
    TrustOnFirstUse { path: Option<PathBuf> },
}

/// Where the private key comes from.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Key material held in memory, usually the `SSH_PRIVATE_KEY` secret.
    KeyMaterial(Secret),
    KeyFile(PathBuf),
    /// Whatever the running SSH agent offers.
    Agent,
}

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    pub user: String,
    pub credential: Credential,
    pub trust: HostTrust,
    /// Timeout for command execution (default: 5 minutes).
    pub command_timeout: Duration,
    /// Timeout for the TCP connect and handshake (default: 15 seconds).
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>, credential: Credential) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            credential,
            trust: HostTrust::KnownHosts { path: None },
            command_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(15),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn trust(mut self, trust: HostTrust) -> Self {
        self.trust = trust;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Output from a remote command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    trust: HostTrust,
}

impl SshHandler {
    fn fingerprint(key: &ssh_key::PublicKey) -> String {
        key.fingerprint(ssh_key::HashAlg::Sha256).to_string()
    }

    fn check_known(
        &self,
        key: &ssh_key::PublicKey,
        path: &Option<PathBuf>,
    ) -> std::result::Result<bool, russh::keys::Error> {
        match path {
            Some(path) => check_known_hosts_path(&self.host, self.port, key, path),
            None => check_known_hosts(&self.host, self.port, key),
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match &self.trust {
            HostTrust::Pinned(expected) => {
                let actual = Self::fingerprint(server_public_key);
                if &actual == expected {
                    Ok(true)
                } else {
                    tracing::warn!(host = %self.host, %expected, %actual, "host key fingerprint mismatch");
                    Ok(false)
                }
            }
            HostTrust::KnownHosts { path } => Ok(matches!(
                self.check_known(server_public_key, path),
                Ok(true)
            )),
            HostTrust::TrustOnFirstUse { path } => match self.check_known(server_public_key, path) {
                Ok(true) => Ok(true),
                Err(russh::keys::Error::KeyChanged { .. }) => Ok(false),
                Ok(false) | Err(_) => {
                    tracing::warn!(
                        host = %self.host,
                        port = self.port,
                        fingerprint = %Self::fingerprint(server_public_key),
                        "trust-on-first-use: accepting unknown host key"
                    );
                    let learned = match path {
                        Some(path) => {
                            learn_known_hosts_path(&self.host, self.port, server_public_key, path)
                        }
                        None => learn_known_hosts(&self.host, self.port, server_public_key),
                    };
                    if let Err(e) = learned {
                        tracing::warn!(error = %e, "failed to save host key to known_hosts");
                    }
                    Ok(true)
                }
            },
        }
    }
}

/// An established SSH session.
pub struct Session {
    config: SessionConfig,
    handle: Handle<SshHandler>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("user", &self.config.user)
            .finish()
    }
}

impl Session {
    /// Connect and authenticate.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let russh_config = Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            trust: config.trust.clone(),
        };

        let connecting = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        );
        let mut handle = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Err(_) => {
                return Err(Error::Unreachable {
                    host: config.host.clone(),
                    port: config.port,
                    reason: format!("no answer within {:?}", config.connect_timeout),
                });
            }
            Ok(Err(russh::Error::UnknownKey)) => {
                return Err(Error::HostKeyRejected {
                    host: config.host.clone(),
                    reason: match config.trust {
                        HostTrust::Pinned(_) => "fingerprint does not match the pinned value",
                        HostTrust::KnownHosts { .. } => "key not present in known_hosts",
                        HostTrust::TrustOnFirstUse { .. } => "key changed since first use",
                    }
                    .to_string(),
                });
            }
            Ok(Err(e)) => {
                return Err(Error::Unreachable {
                    host: config.host.clone(),
                    port: config.port,
                    reason: e.to_string(),
                });
            }
            Ok(Ok(handle)) => handle,
        };

        if !Self::authenticate(&mut handle, &config).await? {
            return Err(Error::AuthenticationFailed {
                host: config.host.clone(),
                user: config.user.clone(),
            });
        }

        Ok(Self { config, handle })
    }

    async fn authenticate(handle: &mut Handle<SshHandler>, config: &SessionConfig) -> Result<bool> {
        let key = match &config.credential {
            Credential::Agent => return Self::authenticate_with_agent(handle, config).await,
            Credential::KeyMaterial(secret) => decode_secret_key(secret.expose(), None)
                .map_err(|e| Error::KeyDecodeFailed(e.to_string()))?,
            Credential::KeyFile(path) => {
                load_secret_key(path, None).map_err(|e| Error::KeyLoadFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
            }
        };

        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .map_err(Error::Protocol)?
            .flatten();

        let result = handle
            .authenticate_publickey(
                &config.user,
                PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
            )
            .await
            .map_err(Error::Protocol)?;

        Ok(result.success())
    }

    async fn authenticate_with_agent(
        handle: &mut Handle<SshHandler>,
        config: &SessionConfig,
    ) -> Result<bool> {
        let mut agent = AgentClient::connect_env()
            .await
            .map_err(|e| Error::AgentUnavailable(e.to_string()))?;
        let keys = agent
            .request_identities()
            .await
            .map_err(|e| Error::AgentUnavailable(format!("failed to list agent keys: {e}")))?;

        if keys.is_empty() {
            return Err(Error::AgentUnavailable("no keys in SSH agent".to_string()));
        }

        for key in &keys {
            match handle
                .authenticate_publickey_with(&config.user, key.clone(), None, &mut agent)
                .await
            {
                Ok(result) if result.success() => return Ok(true),
                _ => continue,
            }
        }
        Ok(false)
    }

    /// Execute a command with the configured timeout.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.exec_with_timeout(command, self.config.command_timeout)
            .await
    }

    /// Execute a command with a custom timeout.
    pub async fn exec_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        match tokio::time::timeout(timeout, self.exec_inner(command, None)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CommandTimeout(timeout)),
        }
    }

    /// Execute a command and feed `input` to its stdin, then close stdin.
    pub async fn exec_with_input(
        &self,
        command: &str,
        input: &[u8],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        match tokio::time::timeout(timeout, self.exec_inner(command, Some(input))).await {
            Ok(result) => result,
            Err(_) => Err(Error::CommandTimeout(timeout)),
        }
    }

    async fn exec_inner(&self, command: &str, input: Option<&[u8]>) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to open channel: {e}")))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to exec command: {e}")))?;

        if let Some(input) = input {
            channel
                .data(input)
                .await
                .map_err(|e| Error::CommandFailed(format!("failed to send stdin: {e}")))?;
            channel
                .eof()
                .await
                .map_err(|e| Error::CommandFailed(format!("failed to close stdin: {e}")))?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = 0u32;

        let mut got_exit_status = false;
        let mut got_eof = false;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = exit_status;
                    got_exit_status = true;
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelMsg::Eof) => {
                    got_eof = true;
                    if got_exit_status {
                        break;
                    }
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }

        // No exit status means the channel died underneath the command.
        if !got_exit_status {
            return Err(Error::ChannelClosed);
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)?;
        Ok(())
    }
}
