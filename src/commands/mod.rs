// ABOUTME: Command module aggregator for the shipyard CLI.
// ABOUTME: Re-exports the run, plan and init handlers plus shared config loading.

mod init;
mod plan;
mod run;

pub use init::init;
pub use plan::plan;
pub use run::run;

use shipyard::config::Config;
use shipyard::error::Result;
use std::env;
use std::path::{Path, PathBuf};

/// Load the config and the directory its relative paths resolve against.
///
/// An explicit path resolves against its parent directory; a discovered config
/// resolves against the current directory.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, Config)> {
    match explicit {
        Some(path) => {
            let config = Config::load(path)?;
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or(env::current_dir()?);
            Ok((base, config))
        }
        None => {
            let cwd = env::current_dir()?;
            let (path, config) = Config::discover(&cwd)?;
            tracing::debug!(path = %path.display(), "configuration discovered");
            Ok((cwd, config))
        }
    }
}
