// ABOUTME: Run command implementation.
// ABOUTME: Builds the release graph, executes it for one trigger, and maps the report to an exit code.

use super::load_config;
use shipyard::error::Result;
use shipyard::output::Output;
use shipyard::pipeline::{PipelineRun, Trigger, TriggerContext};
use shipyard::stages::{Collaborators, standard_graph};
use std::path::Path;

/// Run the pipeline. Returns the process exit code.
pub async fn run(config_path: Option<&Path>, event: Trigger, mut output: Output) -> Result<i32> {
    let (base_dir, config) = load_config(config_path)?;
    let collaborators = Collaborators::from_config(&config, &base_dir);
    let graph = standard_graph(&config, &base_dir, collaborators)?;

    output.start_timer();
    let run = PipelineRun::new(TriggerContext::new(event));
    output.progress(&format!(
        "Running {} ({} stages) for {event} as {}",
        config.app.name,
        graph.len(),
        run.trigger().run_id
    ));

    let cancel = run.cancel_token();
    let interrupt_output = output.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt_output.warning("interrupt received, cancelling run");
            cancel.cancel("interrupted by SIGINT");
        }
    });

    let report = graph.execute(run, config.pipeline.settings()).await;
    interrupt.abort();

    output.report(&report);
    if !report.is_success() {
        let reason = report
            .first_error
            .clone()
            .or_else(|| report.verdict.as_ref().map(|v| v.to_string()))
            .or_else(|| report.cancelled.clone())
            .unwrap_or_else(|| "a required stage did not succeed".to_string());
        output.error(&format!("pipeline failed: {reason}"));
    }
    Ok(report.exit_code())
}
