// ABOUTME: Library root for shipyard - exposes the pipeline engine and its collaborators.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod local;
pub mod output;
pub mod outputs;
pub mod pipeline;
pub mod poll;
pub mod provision;
pub mod registry;
pub mod remote;
pub mod secrets;
pub mod ssh;
pub mod stages;
pub mod types;
