// ABOUTME: Secret values and the keyed secret set handed to stages.
// ABOUTME: Secret never prints its value; SecretSet can redact values out of command output.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Documented secret keys.
pub mod keys {
    pub const SSH_PRIVATE_KEY: &str = "SSH_PRIVATE_KEY";
    pub const SSH_PUBLIC_KEY: &str = "SSH_PUBLIC_KEY";
    pub const DOCKER_HUB_USERNAME: &str = "DOCKER_HUB_USERNAME";
    pub const DOCKER_HUB_TOKEN: &str = "DOCKER_HUB_TOKEN";
    pub const DB_USER: &str = "DB_USER";
    pub const DB_PASS: &str = "DB_PASS";
    pub const DB_NAME: &str = "DB_NAME";
    pub const API_URL: &str = "API_URL";
    pub const DJANGO_SECRET_KEY: &str = "DJANGO_SECRET_KEY";
    pub const NODE_ENV: &str = "NODE_ENV";
}

const REDACTED: &str = "***";

/// Values shorter than this are not scrubbed from output; they would match everywhere.
const MIN_REDACT_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("missing required secret: {0}")]
    Missing(String),

    #[error("malformed secret {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// An opaque secret string.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Keyed secrets resolved for one run.
#[derive(Debug, Clone, Default)]
pub struct SecretSet {
    values: BTreeMap<String, Secret>,
}

impl SecretSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Secret) {
        self.values.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, Secret::new(value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Secret> {
        self.values.get(key)
    }

    /// Look up a secret that must be present and non-empty.
    pub fn require(&self, key: &str) -> Result<&Secret, SecretError> {
        match self.values.get(key) {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(SecretError::Missing(key.to_string())),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every known secret value in `text` with a placeholder.
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in self.values.values() {
            if secret.0.len() >= MIN_REDACT_LEN {
                out = out.replace(&secret.0, REDACTED);
            }
        }
        out
    }
}
