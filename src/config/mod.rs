// ABOUTME: Configuration types and parsing for shipyard.yml.
// ABOUTME: One section per pipeline concern, with defaults for every poll budget.

mod env_value;
mod init;

pub use env_value::{EnvValue, resolve_needed_secrets, resolve_secrets};
pub use init::{init_config, template_yaml};

use crate::error::{Error, Result};
use crate::health::GatePolicy;
use crate::local::LocalCommand;
use crate::pipeline::{PipelineSettings, Trigger};
use crate::poll::PollSettings;
use crate::remote::{COMPOSE_FILE_NAMES, ScriptStep, is_compose_descriptor};
use crate::ssh::HostTrust;
use crate::types::{ImageRef, LogicalName, StageId};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "shipyard.yml";
pub const CONFIG_FILENAME_ALT: &str = "shipyard.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".shipyard/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Secret values, keyed by the documented secret names.
    #[serde(default)]
    pub secrets: BTreeMap<String, EnvValue>,

    #[serde(default)]
    pub prepare: CommandsConfig,

    #[serde(default)]
    pub test: CommandsConfig,

    pub images: ImagesConfig,

    pub provision: ProvisionConfig,

    pub deploy: DeployConfig,

    pub verify: VerifyConfig,

    #[serde(default)]
    pub monitoring: CommandsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Logical name shared by the instance identity and the deployment.
    pub name: LogicalName,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Per-stage trigger filter and timeout overrides.
    #[serde(default)]
    pub stages: BTreeMap<StageId, StageOverride>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            timeout: None,
            stages: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_parallel: self.max_parallel,
            timeout: self.timeout,
        }
    }
}

fn default_max_parallel() -> usize {
    4
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageOverride {
    #[serde(default)]
    pub triggers: Option<Vec<Trigger>>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Local commands run in order by the prepare, test and monitoring stages.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandsConfig {
    #[serde(default)]
    pub commands: Vec<LocalCommand>,

    /// Timeout for commands that do not set their own.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            command_timeout: default_command_timeout(),
        }
    }
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(600)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    /// Registry to log in to; Docker Hub when absent.
    #[serde(default)]
    pub registry: Option<String>,

    pub frontend: ImageConfig,

    pub backend: ImageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageRef,

    pub context: PathBuf,

    #[serde(default)]
    pub dockerfile: Option<PathBuf>,

    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
    /// Program implementing the JSON provider protocol.
    pub program: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default = "default_provider_timeout", with = "humantime_serde")]
    pub provider_timeout: Duration,

    pub instance_type: String,

    /// Extra attributes passed to `create`.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Port that must accept TCP connections before the instance counts as ready.
    #[serde(default)]
    pub reachability_port: Option<u16>,

    #[serde(default = "default_deletion_poll")]
    pub deletion: PollSettings,

    #[serde(default = "default_readiness_poll")]
    pub readiness: PollSettings,
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_deletion_poll() -> PollSettings {
    PollSettings::new(Duration::from_secs(10), 30)
}

fn default_readiness_poll() -> PollSettings {
    PollSettings::new(Duration::from_secs(10), 30)
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    pub user: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Remote deployment directory.
    pub directory: String,

    #[serde(default)]
    pub host_key: HostKeyConfig,

    #[serde(default = "default_liveness_poll")]
    pub liveness: PollSettings,

    /// Local files uploaded into the deployment directory under their file names.
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,

    /// Secrets written to the remote `.env` file.
    #[serde(default)]
    pub env_keys: Vec<String>,

    pub steps: NonEmpty<ScriptStep>,

    #[serde(default = "default_step_timeout", with = "humantime_serde")]
    pub step_timeout: Duration,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_liveness_poll() -> PollSettings {
    PollSettings::new(Duration::from_secs(10), 18).attempt_timeout(Duration::from_secs(20))
}

fn default_step_timeout() -> Duration {
    Duration::from_secs(600)
}

/// How the deployment host's SSH key is trusted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostKeyConfig {
    /// Pinned `SHA256:` fingerprint; takes precedence over everything else.
    #[serde(default)]
    pub fingerprint: Option<String>,

    #[serde(default)]
    pub known_hosts: Option<PathBuf>,

    /// Accept and record unknown keys. Fresh instances have no known key yet.
    #[serde(default)]
    pub trust_on_first_use: bool,
}

impl HostKeyConfig {
    pub fn trust(&self) -> HostTrust {
        match (&self.fingerprint, self.trust_on_first_use) {
            (Some(fp), _) => HostTrust::Pinned(fp.clone()),
            (None, true) => HostTrust::TrustOnFirstUse {
                path: self.known_hosts.clone(),
            },
            (None, false) => HostTrust::KnownHosts {
                path: self.known_hosts.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    /// Defaults to `any`: one healthy endpoint passes the release.
    #[serde(default)]
    pub policy: GatePolicy,

    pub probes: NonEmpty<ProbeConfig>,

    #[serde(default = "default_probe_poll")]
    pub poll: PollSettings,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_probe_poll() -> PollSettings {
    PollSettings::new(Duration::from_secs(20), 8)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

/// An endpoint on the provisioned host.
///
/// Probes speak plain HTTP to `http://<address>:<port><path>`. There is no
/// TLS client, so a probe pointed at a TLS listener fails its handshake and
/// counts as unhealthy. Probe a plain-HTTP port or health sidecar instead.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    pub name: String,

    pub port: u16,

    #[serde(default = "default_probe_path")]
    pub path: String,
}

fn default_probe_path() -> String {
    "/".to_string()
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Find the config file in `dir`. Returns the path it was loaded from as well.
    pub fn discover(dir: &Path) -> Result<(PathBuf, Self)> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in candidates {
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok((path, config));
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.max_parallel == 0 {
            return Err(Error::InvalidConfig(
                "pipeline.max_parallel must be at least 1".to_string(),
            ));
        }

        if let Some(ref fp) = self.deploy.host_key.fingerprint
            && !fp.starts_with("SHA256:")
        {
            return Err(Error::InvalidConfig(format!(
                "deploy.host_key.fingerprint must start with SHA256: (got {fp})"
            )));
        }

        let mut names = HashSet::new();
        for probe in &self.verify.probes {
            if !probe.path.starts_with('/') {
                return Err(Error::InvalidConfig(format!(
                    "verify probe '{}': path must start with '/'",
                    probe.name
                )));
            }
            if !names.insert(probe.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "verify probe '{}' is defined more than once",
                    probe.name
                )));
            }
        }

        if self.deploy.steps.iter().any(ScriptStep::needs_compose)
            && !self
                .deploy
                .artifacts
                .iter()
                .filter_map(|a| a.file_name().and_then(|n| n.to_str()))
                .any(is_compose_descriptor)
        {
            return Err(Error::InvalidConfig(format!(
                "deploy.artifacts must include a compose descriptor ({}) when a step uses {{compose}}",
                COMPOSE_FILE_NAMES.join(", ")
            )));
        }

        let mut steps = HashSet::new();
        for step in &self.deploy.steps {
            if !steps.insert(step.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "deploy step '{}' is defined more than once",
                    step.name
                )));
            }
        }
        Ok(())
    }
}

fn deserialize_image_ref<'de, D>(deserializer: D) -> std::result::Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageRef::parse(&s).map_err(serde::de::Error::custom)
}
