// ABOUTME: Init command implementation.
// ABOUTME: Scaffolds shipyard.yml, naming the app after the directory unless told otherwise.

use shipyard::config;
use shipyard::error::Result;
use shipyard::output::Output;
use std::env;
use std::path::Path;

pub fn init(name: Option<&str>, force: bool, output: Output) -> Result<()> {
    let cwd = env::current_dir()?;
    let name = match name {
        Some(n) => n.to_string(),
        None => default_name(&cwd),
    };
    let path = config::init_config(&cwd, &name, force)?;
    output.success(&format!("Created {}", path.display()));
    Ok(())
}

/// Lowercased directory name with anything outside `[a-z0-9-]` turned into hyphens.
fn default_name(dir: &Path) -> String {
    let raw = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect();
    let trimmed: String = cleaned.trim_matches('-').chars().take(63).collect();
    let trimmed = trimmed.trim_end_matches('-');
    if trimmed.is_empty() {
        "app".to_string()
    } else {
        trimmed.to_string()
    }
}
