// ABOUTME: Compose tool detection on the remote host.
// ABOUTME: Checks the docker compose plugin first, then docker-compose, then podman-compose.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::shell::RemoteShell;
use crate::ssh;

/// The compose front-end available on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComposeTool {
    /// `docker compose` (v2 plugin)
    DockerPlugin,
    /// `docker-compose` (standalone v1 binary)
    DockerStandalone,
    PodmanCompose,
}

impl ComposeTool {
    /// Detection order.
    pub const ALL: [ComposeTool; 3] = [
        ComposeTool::DockerPlugin,
        ComposeTool::DockerStandalone,
        ComposeTool::PodmanCompose,
    ];

    /// The command prefix used to invoke the tool.
    pub fn command(&self) -> &'static str {
        match self {
            ComposeTool::DockerPlugin => "docker compose",
            ComposeTool::DockerStandalone => "docker-compose",
            ComposeTool::PodmanCompose => "podman-compose",
        }
    }
}

impl fmt::Display for ComposeTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// File names every supported compose tool picks up from the working directory.
pub const COMPOSE_FILE_NAMES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

pub fn is_compose_descriptor(file_name: &str) -> bool {
    COMPOSE_FILE_NAMES.contains(&file_name)
}

/// Find the first compose tool that answers `version` on the host.
///
/// Returns `Ok(None)` when none is installed; transport failures propagate.
pub async fn detect_compose(
    shell: &dyn RemoteShell,
    timeout: Duration,
) -> ssh::Result<Option<ComposeTool>> {
    for tool in ComposeTool::ALL {
        let probe = format!("{} version >/dev/null 2>&1", tool.command());
        let output = shell.exec(&probe, timeout).await?;
        if output.success() {
            tracing::debug!(tool = %tool, "compose tool detected");
            return Ok(Some(tool));
        }
    }
    Ok(None)
}
