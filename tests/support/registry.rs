// ABOUTME: Image builder that records logins and builds instead of running docker.
// ABOUTME: Can be told to fail the build of a specific repository.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shipyard::registry::{BuildError, BuildRequest, ImageBuilder};
use shipyard::secrets::Secret;
use shipyard::types::ImageRef;

#[derive(Debug, Clone, Default)]
pub struct FakeBuilder {
    logins: Arc<Mutex<Vec<String>>>,
    builds: Arc<Mutex<Vec<BuildRequest>>>,
    fail_repository: Option<String>,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_build_of(mut self, repository: &str) -> Self {
        self.fail_repository = Some(repository.to_string());
        self
    }

    pub fn logins(&self) -> Vec<String> {
        self.logins.lock().clone()
    }

    pub fn builds(&self) -> Vec<BuildRequest> {
        self.builds.lock().clone()
    }
}

#[async_trait]
impl ImageBuilder for FakeBuilder {
    async fn login(
        &self,
        _registry: Option<&str>,
        username: &str,
        _token: &Secret,
    ) -> Result<(), BuildError> {
        self.logins.lock().push(username.to_string());
        Ok(())
    }

    async fn build_and_push(&self, request: &BuildRequest) -> Result<ImageRef, BuildError> {
        self.builds.lock().push(request.clone());
        if self.fail_repository.as_deref() == Some(request.image.repository()) {
            return Err(BuildError::Build {
                image: request.image.to_string(),
                detail: "exit code 1: npm ERR! build failed".to_string(),
            });
        }
        Ok(request.image.clone())
    }
}
