// ABOUTME: Per-run state shared by all stages, and the view each stage gets of it.
// ABOUTME: Output publishing is scoped to the stage; the verdict can be recorded once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::StageError;
use crate::health::Verdict;
use crate::outputs::{OutputKey, OutputStore};
use crate::poll::CancellationToken;
use crate::types::{RunId, StageId};

/// What started the run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Push,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Push => f.write_str("push"),
            Trigger::Manual => f.write_str("manual"),
        }
    }
}

/// Facts about the run, fixed when it starts.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerContext {
    pub event: Trigger,
    pub started_at: DateTime<Utc>,
    pub host: String,
    pub run_id: RunId,
}

impl TriggerContext {
    pub fn new(event: Trigger) -> Self {
        Self {
            event,
            started_at: Utc::now(),
            host: gethostname::gethostname().to_string_lossy().into_owned(),
            run_id: RunId::generate(),
        }
    }

    /// Environment variables handed to local commands.
    pub fn to_env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("SHIPYARD_EVENT".to_string(), self.event.to_string()),
            ("SHIPYARD_RUN_ID".to_string(), self.run_id.to_string()),
            ("SHIPYARD_HOST".to_string(), self.host.clone()),
            ("SHIPYARD_STARTED_AT".to_string(), self.started_at.to_rfc3339()),
        ])
    }
}

/// One execution of a stage graph. Consumed by [`super::StageGraph::execute`].
#[derive(Debug)]
pub struct PipelineRun {
    pub(crate) trigger: Arc<TriggerContext>,
    pub(crate) outputs: OutputStore,
    pub(crate) cancel: CancellationToken,
    pub(crate) verdict: Arc<OnceLock<Verdict>>,
}

impl PipelineRun {
    pub fn new(trigger: TriggerContext) -> Self {
        Self {
            trigger: Arc::new(trigger),
            outputs: OutputStore::new(),
            cancel: CancellationToken::new(),
            verdict: Arc::new(OnceLock::new()),
        }
    }

    pub fn trigger(&self) -> &TriggerContext {
        &self.trigger
    }

    /// Handle for cancelling the run from outside, e.g. on SIGINT.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    pub(crate) fn stage_context(&self, stage: &StageId) -> StageContext {
        StageContext {
            stage: stage.clone(),
            trigger: Arc::clone(&self.trigger),
            outputs: self.outputs.clone(),
            cancel: self.cancel.clone(),
            verdict: Arc::clone(&self.verdict),
        }
    }
}

/// What a running stage can see and do.
#[derive(Debug, Clone)]
pub struct StageContext {
    stage: StageId,
    trigger: Arc<TriggerContext>,
    outputs: OutputStore,
    cancel: CancellationToken,
    verdict: Arc<OnceLock<Verdict>>,
}

impl StageContext {
    pub fn stage(&self) -> &StageId {
        &self.stage
    }

    pub fn trigger(&self) -> &TriggerContext {
        &self.trigger
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Publish `name` under this stage's namespace.
    pub fn publish(&self, name: &str, value: impl Into<String>) -> Result<(), StageError> {
        let key = OutputKey::new(self.stage.clone(), name);
        self.outputs.publish(&self.stage, &key, value)?;
        Ok(())
    }

    /// Read an output an upstream stage must have published.
    pub fn require(&self, key: &OutputKey) -> Result<String, StageError> {
        Ok(self.outputs.require(key)?)
    }

    pub fn get(&self, key: &OutputKey) -> Option<String> {
        self.outputs.get(key)
    }

    /// Record the run's health verdict. Only one verdict per run.
    pub fn record_verdict(&self, verdict: Verdict) -> Result<(), StageError> {
        self.verdict.set(verdict).map_err(|_| {
            StageError::Config(format!(
                "stage {} tried to record a second health verdict",
                self.stage
            ))
        })
    }
}
