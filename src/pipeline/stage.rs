// ABOUTME: Stage definition: id, dependencies, runner, and scheduling attributes.
// ABOUTME: Runners are trait objects; closures can be wrapped with Stage::from_fn.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::context::{StageContext, Trigger};
use super::error::StageError;
use crate::types::StageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::Pending | StageStatus::Running)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
            StageStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The work a stage performs.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageError>;
}

struct FnRunner<F>(F);

#[async_trait]
impl<F, Fut> StageRunner for FnRunner<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StageError>> + Send,
{
    async fn run(&self, ctx: &StageContext) -> Result<(), StageError> {
        (self.0)(ctx.clone()).await
    }
}

/// A node in the stage graph.
#[derive(Clone)]
pub struct Stage {
    pub(crate) id: StageId,
    pub(crate) depends_on: Vec<StageId>,
    pub(crate) runner: Arc<dyn StageRunner>,
    pub(crate) best_effort: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) triggers: BTreeSet<Trigger>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("best_effort", &self.best_effort)
            .field("timeout", &self.timeout)
            .field("triggers", &self.triggers)
            .finish()
    }
}

impl Stage {
    /// A stage that runs on every trigger with no dependencies.
    pub fn new(id: StageId, runner: Arc<dyn StageRunner>) -> Self {
        Self {
            id,
            depends_on: Vec::new(),
            runner,
            best_effort: false,
            timeout: None,
            triggers: BTreeSet::from([Trigger::Push, Trigger::Manual]),
        }
    }

    pub fn from_fn<F, Fut>(id: StageId, f: F) -> Self
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        Self::new(id, Arc::new(FnRunner(f)))
    }

    pub fn after(mut self, dependency: StageId) -> Self {
        self.depends_on.push(dependency);
        self
    }

    /// Failures are recorded but never block dependents.
    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Restrict the stage to the given trigger events.
    pub fn triggers(mut self, triggers: impl IntoIterator<Item = Trigger>) -> Self {
        self.triggers = triggers.into_iter().collect();
        self
    }

    pub fn id(&self) -> &StageId {
        &self.id
    }

    pub fn depends_on(&self) -> &[StageId] {
        &self.depends_on
    }

    pub fn is_best_effort(&self) -> bool {
        self.best_effort
    }

    pub fn runs_on(&self, trigger: Trigger) -> bool {
        self.triggers.contains(&trigger)
    }

    pub fn trigger_filter(&self) -> impl Iterator<Item = Trigger> + '_ {
        self.triggers.iter().copied()
    }
}
