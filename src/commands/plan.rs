// ABOUTME: Plan command implementation.
// ABOUTME: Builds the release graph from config without running it and prints the stage order.

use super::load_config;
use shipyard::error::Result;
use shipyard::pipeline::{StageGraph, Trigger};
use shipyard::stages::{Collaborators, standard_graph};
use std::fmt::Write;
use std::path::Path;

pub fn plan(config_path: Option<&Path>, event: Option<Trigger>) -> Result<()> {
    let (base_dir, config) = load_config(config_path)?;
    let collaborators = Collaborators::from_config(&config, &base_dir);
    let graph = standard_graph(&config, &base_dir, collaborators)?;
    print!("{}", render_plan(&graph, event));
    Ok(())
}

fn render_plan(graph: &StageGraph, event: Option<Trigger>) -> String {
    let mut out = String::new();
    for (n, stage) in graph.ordered().enumerate() {
        let triggers: Vec<String> = stage.trigger_filter().map(|t| t.to_string()).collect();
        let _ = write!(out, "{:>2}. {:<16} on [{}]", n + 1, stage.id().as_str(), triggers.join(", "));
        if !stage.depends_on().is_empty() {
            let deps: Vec<&str> = stage.depends_on().iter().map(|d| d.as_str()).collect();
            let _ = write!(out, " after {}", deps.join(", "));
        }
        if stage.is_best_effort() {
            out.push_str(" (best effort)");
        }
        if let Some(event) = event
            && !stage.runs_on(event)
        {
            let _ = write!(out, " -- skipped for {event}");
        }
        out.push('\n');
    }
    out
}
