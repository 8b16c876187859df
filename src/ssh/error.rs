// ABOUTME: Errors raised by the SSH transport to a deployment host.
// ABOUTME: Reachability, host trust, authentication and command failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot reach {host}:{port}: {reason}")]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("host key for {host} rejected: {reason}")]
    HostKeyRejected { host: String, reason: String },

    #[error("user '{user}' was not accepted by {host}")]
    AuthenticationFailed { host: String, user: String },

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("private key material could not be decoded: {0}")]
    KeyDecodeFailed(String),

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("writing {path} failed: {reason}")]
    UploadFailed { path: String, reason: String },

    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
