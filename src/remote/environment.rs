// ABOUTME: Files placed in the remote deployment directory before any step runs.
// ABOUTME: Configuration artifacts plus a generated .env holding the run's secrets.

use std::time::Duration;

use super::compose::is_compose_descriptor;
use super::error::RemoteError;
use super::shell::{RemoteShell, shell_quote};
use crate::secrets::SecretSet;

pub const ENV_FILE_NAME: &str = ".env";
const ENV_FILE_MODE: u32 = 0o600;
const ARTIFACT_MODE: u32 = 0o644;

/// A configuration file uploaded verbatim, e.g. the compose descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub contents: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Everything the deployment directory must contain.
#[derive(Debug, Clone)]
pub struct DeploymentEnvironment {
    directory: String,
    artifacts: Vec<Artifact>,
    env: SecretSet,
}

impl DeploymentEnvironment {
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            artifacts: Vec::new(),
            env: SecretSet::new(),
        }
    }

    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Secrets rendered into the `.env` file.
    pub fn env(mut self, env: SecretSet) -> Self {
        self.env = env;
        self
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn secrets(&self) -> &SecretSet {
        &self.env
    }

    /// The artifact the compose entrypoint reads, if one is uploaded.
    pub fn compose_descriptor(&self) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| is_compose_descriptor(&a.name))
    }

    pub fn path_of(&self, name: &str) -> String {
        format!("{}/{}", self.directory.trim_end_matches('/'), name)
    }

    /// Create the directory, upload every file, and verify each is present and non-empty.
    ///
    /// Returns the remote paths written.
    pub async fn materialize(
        &self,
        shell: &dyn RemoteShell,
        timeout: Duration,
    ) -> Result<Vec<String>, RemoteError> {
        let mkdir = format!("mkdir -p {}", shell_quote(&self.directory));
        let output = shell.exec(&mkdir, timeout).await?;
        if !output.success() {
            return Err(RemoteError::Materialize {
                path: self.directory.clone(),
                reason: output.stderr.trim().to_string(),
            });
        }

        let mut written = Vec::with_capacity(self.artifacts.len() + 1);
        for artifact in &self.artifacts {
            let path = self.path_of(&artifact.name);
            shell
                .write_file(&path, &artifact.contents, ARTIFACT_MODE, timeout)
                .await?;
            written.push(path);
        }

        let env_path = self.path_of(ENV_FILE_NAME);
        let rendered = render_env_file(&self.env);
        shell
            .write_file(&env_path, rendered.as_bytes(), ENV_FILE_MODE, timeout)
            .await?;
        written.push(env_path);

        for path in &written {
            let check = format!("test -s {}", shell_quote(path));
            if !shell.exec(&check, timeout).await?.success() {
                return Err(RemoteError::EnvironmentIncomplete { path: path.clone() });
            }
            tracing::debug!(path = %path, "verified remote file");
        }
        Ok(written)
    }
}

const ENV_FILE_HEADER: &str = "# generated by shipyard; do not edit\n";

/// Render secrets as `KEY=value` lines, quoting values that need it.
pub fn render_env_file(secrets: &SecretSet) -> String {
    let mut out = String::from(ENV_FILE_HEADER);
    for key in secrets.keys() {
        let Some(value) = secrets.get(key) else {
            continue;
        };
        out.push_str(key);
        out.push('=');
        out.push_str(&quote_env_value(value.expose()));
        out.push('\n');
    }
    out
}

fn quote_env_value(value: &str) -> String {
    let plain = value.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '@' | ',' | '+')
    });
    if plain {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '$' => quoted.push_str("\\$"),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_sorted_lines() {
        let secrets = SecretSet::new()
            .with("DB_USER", "app")
            .with("API_URL", "http://203.0.113.10:8000");
        assert_eq!(
            render_env_file(&secrets),
            format!("{ENV_FILE_HEADER}API_URL=http://203.0.113.10:8000\nDB_USER=app\n")
        );
    }

    #[test]
    fn values_with_special_characters_are_quoted() {
        let secrets = SecretSet::new().with("DJANGO_SECRET_KEY", "a b\"$c");
        assert_eq!(
            render_env_file(&secrets),
            format!("{ENV_FILE_HEADER}DJANGO_SECRET_KEY=\"a b\\\"\\$c\"\n")
        );
    }

    #[test]
    fn paths_join_without_double_slash() {
        let env = DeploymentEnvironment::new("/srv/app/");
        assert_eq!(env.path_of(ENV_FILE_NAME), "/srv/app/.env");
    }
}
