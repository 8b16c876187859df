// ABOUTME: Entry point for the shipyard CLI application.
// ABOUTME: Parses arguments, installs logging, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use shipyard::error::Result;
use shipyard::output::{Output, OutputMode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(output_mode(&cli.command));

    let code = match dispatch(cli, output.clone()).await {
        Ok(code) => code,
        Err(e) => {
            output.error(&e.to_string());
            1
        }
    };
    std::process::exit(code);
}

fn output_mode(command: &Commands) -> OutputMode {
    match command {
        Commands::Run { json: true, .. } => OutputMode::Json,
        Commands::Run { quiet: true, .. } => OutputMode::Quiet,
        _ => OutputMode::Normal,
    }
}

async fn dispatch(cli: Cli, output: Output) -> Result<i32> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run { event, .. } => commands::run(config, event, output).await,
        Commands::Plan { event } => commands::plan(config, event).map(|()| 0),
        Commands::Init { name, force } => commands::init(name.as_deref(), force, output).map(|()| 0),
    }
}
