// ABOUTME: Container image build-and-push collaborator.
// ABOUTME: The docker CLI implementation uses buildx with a registry-backed build cache.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::secrets::Secret;
use crate::types::ImageRef;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to run {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("registry login failed: {0}")]
    Login(String),

    #[error("build of {image} failed: {detail}")]
    Build { image: String, detail: String },
}

/// One image to build from a local context and push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub image: ImageRef,
    pub context: PathBuf,
    pub dockerfile: Option<PathBuf>,
    pub build_args: BTreeMap<String, String>,
}

impl BuildRequest {
    pub fn new(image: ImageRef, context: impl Into<PathBuf>) -> Self {
        Self {
            image,
            context: context.into(),
            dockerfile: None,
            build_args: BTreeMap::new(),
        }
    }

    pub fn dockerfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.dockerfile = Some(path.into());
        self
    }

    pub fn build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    /// Arguments after the program name.
    pub fn buildx_args(&self) -> Vec<String> {
        let cache = self.image.cache_ref();
        let mut args = vec![
            "buildx".to_string(),
            "build".to_string(),
            "--push".to_string(),
            "--tag".to_string(),
            self.image.to_string(),
            "--cache-from".to_string(),
            format!("type=registry,ref={cache}"),
            "--cache-to".to_string(),
            format!("type=registry,ref={cache},mode=max"),
        ];
        if let Some(ref dockerfile) = self.dockerfile {
            args.push("--file".to_string());
            args.push(dockerfile.display().to_string());
        }
        for (key, value) in &self.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.context.display().to_string());
        args
    }
}

/// Builds images and publishes them to a registry.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn login(
        &self,
        registry: Option<&str>,
        username: &str,
        token: &Secret,
    ) -> Result<(), BuildError>;

    async fn build_and_push(&self, request: &BuildRequest) -> Result<ImageRef, BuildError>;
}

/// Shells out to the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn spawn_error(&self, e: std::io::Error) -> BuildError {
        BuildError::Spawn {
            program: self.program.clone(),
            reason: e.to_string(),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn login(
        &self,
        registry: Option<&str>,
        username: &str,
        token: &Secret,
    ) -> Result<(), BuildError> {
        let mut command = Command::new(&self.program);
        command.arg("login");
        if let Some(registry) = registry {
            command.arg(registry);
        }
        let mut child = command
            .args(["--username", username, "--password-stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(token.expose().as_bytes())
                .await
                .map_err(|e| self.spawn_error(e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(BuildError::Login(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        tracing::info!(registry = registry.unwrap_or("docker.io"), "logged in to registry");
        Ok(())
    }

    async fn build_and_push(&self, request: &BuildRequest) -> Result<ImageRef, BuildError> {
        tracing::info!(image = %request.image, context = %request.context.display(), "building image");
        let output = Command::new(&self.program)
            .args(request.buildx_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.trim_end().lines().rev().take(10).collect();
            return Err(BuildError::Build {
                image: request.image.to_string(),
                detail: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            });
        }
        tracing::info!(image = %request.image, "image pushed");
        Ok(request.image.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buildx_args_push_with_registry_cache() {
        let image = ImageRef::parse("acme/shop-frontend").unwrap();
        let request = BuildRequest::new(image, "frontend").build_arg("API_URL", "http://api");
        assert_eq!(
            request.buildx_args(),
            vec![
                "buildx",
                "build",
                "--push",
                "--tag",
                "acme/shop-frontend:latest",
                "--cache-from",
                "type=registry,ref=acme/shop-frontend:buildcache",
                "--cache-to",
                "type=registry,ref=acme/shop-frontend:buildcache,mode=max",
                "--build-arg",
                "API_URL=http://api",
                "frontend",
            ]
        );
    }
}
