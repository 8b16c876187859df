// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shipyard::pipeline::Trigger;

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(about = "Provision, deploy and health-gate a containerized application")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file (default: discovered in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the release pipeline
    Run {
        /// Event that triggered the run
        #[arg(short, long, value_enum, default_value_t = Trigger::Push)]
        event: Trigger,

        /// Only print the final result
        #[arg(short, long, conflicts_with = "json")]
        quiet: bool,

        /// Print JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the stage order, dependencies and trigger filters
    Plan {
        /// Mark the stages that would be skipped for this event
        #[arg(short, long, value_enum)]
        event: Option<Trigger>,
    },

    /// Initialize a new shipyard.yml configuration file
    Init {
        /// Application name (default: the current directory's name)
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },
}
