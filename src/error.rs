// ABOUTME: Errors that stop shipyard before a run starts: config discovery, parsing, graph wiring.
// ABOUTME: Failures during a run become stage statuses instead; see pipeline::StageError.

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::GraphError;
use crate::types::{LabelError, StageId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid configuration: {0}")]
    InvalidName(#[from] LabelError),

    #[error("invalid configuration: pipeline.stages.{stage}: no such stage (known: {known})")]
    UnknownStage { stage: StageId, known: String },

    #[error("invalid stage graph: {0}")]
    Graph(#[from] GraphError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
