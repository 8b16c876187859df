// ABOUTME: Image build stages: build with registry cache and push, then publish the image ref.
// ABOUTME: Logs in first when registry credentials are configured.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::commands::SecretSlot;
use super::resolved;
use crate::config::ImageConfig;
use crate::pipeline::{StageContext, StageError, StageRunner};
use crate::registry::{BuildRequest, ImageBuilder};
use crate::secrets::keys;

pub struct BuildStage {
    request: BuildRequest,
    registry: Option<String>,
    builder: Arc<dyn ImageBuilder>,
    secrets: SecretSlot,
}

impl std::fmt::Debug for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildStage")
            .field("request", &self.request)
            .field("registry", &self.registry)
            .finish()
    }
}

impl BuildStage {
    pub fn new(
        image: &ImageConfig,
        registry: Option<String>,
        base_dir: &Path,
        builder: Arc<dyn ImageBuilder>,
        secrets: SecretSlot,
    ) -> Self {
        let mut request = BuildRequest::new(image.image.clone(), base_dir.join(&image.context));
        if let Some(ref dockerfile) = image.dockerfile {
            request = request.dockerfile(base_dir.join(dockerfile));
        }
        for (key, value) in &image.build_args {
            request = request.build_arg(key, value);
        }
        Self {
            request,
            registry,
            builder,
            secrets,
        }
    }
}

#[async_trait]
impl StageRunner for BuildStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageError> {
        let secrets = resolved(&self.secrets)?;
        if let (Some(user), Some(token)) = (
            secrets.get(keys::DOCKER_HUB_USERNAME),
            secrets.get(keys::DOCKER_HUB_TOKEN),
        ) {
            self.builder
                .login(self.registry.as_deref(), user.expose(), token)
                .await?;
        }

        let pushed = tokio::select! {
            biased;
            _ = ctx.cancel_token().cancelled() => return Err(StageError::Cancelled),
            result = self.builder.build_and_push(&self.request) => result?,
        };
        tracing::info!(stage = %ctx.stage(), image = %pushed, "image pushed");
        ctx.publish("image", pushed.to_string())
    }
}
