// ABOUTME: Run-wide table of values one stage produces for later stages.
// ABOUTME: Keys are stage-qualified; only the owning stage may publish under them.

use crate::types::StageId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutputError {
    /// A consumer asked for a key nobody published. Always a setup defect.
    #[error("required output {0} has not been published")]
    Missing(OutputKey),

    #[error("stage {stage} cannot publish {key}: key belongs to another stage")]
    NotOwner { stage: StageId, key: OutputKey },
}

/// Stage-qualified output name, displayed as `stage.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputKey {
    pub stage: StageId,
    pub name: String,
}

impl OutputKey {
    pub fn new(stage: StageId, name: impl Into<String>) -> Self {
        Self {
            stage,
            name: name.into(),
        }
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stage, self.name)
    }
}

/// Shared output table for one pipeline run. Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    entries: Arc<RwLock<BTreeMap<OutputKey, String>>>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value on behalf of `stage`.
    ///
    /// Republishing by the owner replaces the value; a stage attempt that is retried
    /// may legitimately produce a fresh value.
    pub fn publish(
        &self,
        stage: &StageId,
        key: &OutputKey,
        value: impl Into<String>,
    ) -> Result<(), OutputError> {
        if &key.stage != stage {
            return Err(OutputError::NotOwner {
                stage: stage.clone(),
                key: key.clone(),
            });
        }
        let value = value.into();
        if self.entries.write().insert(key.clone(), value).is_some() {
            tracing::debug!(key = %key, "output replaced by owning stage");
        } else {
            tracing::debug!(key = %key, "output published");
        }
        Ok(())
    }

    pub fn get(&self, key: &OutputKey) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    /// Read a value that must have been published by an upstream stage.
    pub fn require(&self, key: &OutputKey) -> Result<String, OutputError> {
        self.get(key).ok_or_else(|| OutputError::Missing(key.clone()))
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(s: &str) -> StageId {
        StageId::new(s).unwrap()
    }

    #[test]
    fn owner_publishes_and_consumers_read() {
        let store = OutputStore::new();
        let key = OutputKey::new(stage("provision"), "address");
        store.publish(&stage("provision"), &key, "203.0.113.10").unwrap();

        let consumer_view = store.clone();
        assert_eq!(consumer_view.require(&key).unwrap(), "203.0.113.10");
        assert_eq!(key.to_string(), "provision.address");
    }

    #[test]
    fn foreign_stage_cannot_publish() {
        let store = OutputStore::new();
        let key = OutputKey::new(stage("provision"), "address");
        let err = store.publish(&stage("deploy"), &key, "x").unwrap_err();
        assert!(matches!(err, OutputError::NotOwner { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn missing_key_is_reported_with_its_name() {
        let store = OutputStore::new();
        let key = OutputKey::new(stage("provision"), "address");
        assert_eq!(
            store.require(&key).unwrap_err().to_string(),
            "required output provision.address has not been published"
        );
    }
}
