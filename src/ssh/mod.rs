// ABOUTME: SSH transport for the remote executor.
// ABOUTME: Key material from the secret set, with pinned-fingerprint or known_hosts host trust.

mod client;
mod error;

pub use client::{CommandOutput, Credential, HostTrust, Session, SessionConfig};
pub use error::{Error, Result};
