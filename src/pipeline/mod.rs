// ABOUTME: Stage dependency engine: graph validation, scheduling, and the run report.
// ABOUTME: Stages run as soon as their dependencies are terminal, bounded by a worker pool.

mod context;
mod error;
mod graph;
mod report;
mod stage;

pub use context::{PipelineRun, StageContext, Trigger, TriggerContext};
pub use error::{GraphError, StageError};
pub use graph::{CANCEL_GRACE, PipelineSettings, StageGraph};
pub use report::{RunReport, StageRecord};
pub use stage::{Stage, StageRunner, StageStatus};
