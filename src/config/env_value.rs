// ABOUTME: Secret sources in the config file: a literal, or an environment variable with a default.
// ABOUTME: Resolved once per run by the prepare stage into a redacting SecretSet.

use crate::error::{Error, Result};
use crate::secrets::{Secret, SecretSet};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    /// Resolve against the process environment.
    ///
    /// A variable that is set but empty counts as unset: CI runners export
    /// undefined secrets as empty strings.
    pub fn resolve(&self) -> Result<Secret> {
        match self {
            EnvValue::Literal(s) => Ok(Secret::new(s.clone())),
            EnvValue::FromEnv { var, default } => std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| default.clone())
                .map(Secret::new)
                .ok_or_else(|| Error::MissingEnvVar(var.clone())),
        }
    }
}

/// Where a value comes from, safe to log.
impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Literal(_) => f.write_str("literal"),
            EnvValue::FromEnv { var, default: None } => write!(f, "${var}"),
            EnvValue::FromEnv {
                var,
                default: Some(_),
            } => write!(f, "${var} (with default)"),
        }
    }
}

/// Resolve every configured secret. Fails on the first unset variable without a default.
pub fn resolve_secrets(map: &BTreeMap<String, EnvValue>) -> Result<SecretSet> {
    resolve_needed_secrets(map, |_| true)
}

/// Resolve the secrets a run needs.
///
/// Keys for which `needed` returns true must resolve. Any other key is resolved
/// when its source is available and left out of the set otherwise.
pub fn resolve_needed_secrets(
    map: &BTreeMap<String, EnvValue>,
    needed: impl Fn(&str) -> bool,
) -> Result<SecretSet> {
    let mut secrets = SecretSet::new();
    for (key, source) in map {
        match source.resolve() {
            Ok(value) => {
                tracing::debug!(key = %key, source = %source, "resolved secret");
                secrets.insert(key.clone(), value);
            }
            Err(e) if needed(key) => return Err(e),
            Err(_) => {
                tracing::debug!(key = %key, source = %source, "secret not needed for this run, left unset");
            }
        }
    }
    Ok(secrets)
}
