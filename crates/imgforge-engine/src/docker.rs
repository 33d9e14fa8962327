//! Docker daemon build engine.

use async_trait::async_trait;
use bollard::Docker;
use bollard::image::{BuildImageOptions, PushImageOptions, TagImageOptions};
use bytes::Bytes;
use futures::StreamExt;
use imgforge_core::{
    BuildEngine, BuildSpec, ContextOptions, Error, ImageArtifact, LogSink, Result, SourceContext,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::git;

/// Engine that clones contexts with git and builds through the Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Create a new DockerEngine connecting to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Check the daemon is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| Error::Internal(format!("docker daemon unreachable: {}", e)))?;
        Ok(())
    }
}

/// Dockerfile path relative to the context root, as the daemon expects it.
fn relative_dockerfile(context: &Path, dockerfile: &Path) -> String {
    dockerfile
        .strip_prefix(context)
        .unwrap_or(dockerfile)
        .to_string_lossy()
        .to_string()
}

/// Split `registry:5000/app:tag` into (`registry:5000/app`, `tag`).
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.rfind(':') {
        Some(idx) if !reference[idx + 1..].contains('/') => {
            (&reference[..idx], &reference[idx + 1..])
        }
        _ => (reference, "latest"),
    }
}

/// Pack a context directory into an uncompressed tarball.
async fn tar_context(path: PathBuf) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let mut builder = tar::Builder::new(Vec::new());
        builder.follow_symlinks(false);
        builder.append_dir_all(".", &path)?;
        builder.into_inner()
    })
    .await
    .map_err(|e| Error::Internal(format!("context packing task failed: {}", e)))?
    .map_err(|e| Error::Build(format!("failed to pack build context: {}", e)))
}

#[async_trait]
impl BuildEngine for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn resolve_context(
        &self,
        locator: &str,
        options: &ContextOptions,
        logs: &LogSink,
    ) -> Result<SourceContext> {
        git::clone_context(locator, options, logs).await
    }

    async fn execute_build(&self, spec: &BuildSpec, logs: &LogSink) -> Result<ImageArtifact> {
        let (primary, extra) = spec
            .destinations
            .split_first()
            .ok_or_else(|| Error::Build("no destination for image".to_string()))?;

        let dockerfile = relative_dockerfile(&spec.context.path, &spec.dockerfile);
        info!(context = %spec.context.path.display(), dockerfile = %dockerfile, image = %primary, "Building image");

        let tarball = tar_context(spec.context.path.clone()).await?;

        let options = BuildImageOptions {
            dockerfile,
            t: primary.clone(),
            platform: spec.platform.clone(),
            buildargs: spec
                .build_args
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>(),
            nocache: !spec.cache,
            rm: true,
            ..Default::default()
        };

        let mut image_id = None;
        let mut stream = self
            .docker
            .build_image(options, None, Some(Bytes::from(tarball)));
        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| Error::Build(e.to_string()))?;
            if let Some(error) = info.error {
                return Err(Error::Build(error));
            }
            if let Some(text) = info.stream {
                logs.write(text);
            }
            if let Some(status) = info.status {
                logs.line(status);
            }
            if let Some(id) = info.aux.and_then(|aux| aux.id) {
                debug!(id = %id, "Image built");
                image_id = Some(id);
            }
        }

        for reference in extra {
            let (repo, tag) = split_reference(reference);
            self.docker
                .tag_image(
                    primary,
                    Some(TagImageOptions {
                        repo: repo.to_string(),
                        tag: tag.to_string(),
                    }),
                )
                .await
                .map_err(|e| Error::Build(format!("failed to tag {}: {}", reference, e)))?;
        }

        Ok(ImageArtifact {
            id: image_id,
            references: spec.destinations.clone(),
        })
    }

    async fn push(
        &self,
        artifact: &ImageArtifact,
        _spec: &BuildSpec,
        logs: &LogSink,
    ) -> Result<()> {
        for reference in &artifact.references {
            let (repo, tag) = split_reference(reference);
            info!(image = %reference, "Pushing image");
            logs.line(format!("Pushing {}", reference));

            let options = PushImageOptions {
                tag: tag.to_string(),
            };
            let mut stream = self.docker.push_image(repo, Some(options), None);
            while let Some(result) = stream.next().await {
                let info = result.map_err(|e| Error::Build(e.to_string()))?;
                if let Some(error) = info.error {
                    warn!(image = %reference, error = %error, "Push failed");
                    return Err(Error::Build(error));
                }
                if let Some(status) = info.status {
                    match info.progress {
                        Some(progress) => logs.line(format!("{} {}", status, progress)),
                        None => logs.line(status),
                    }
                }
            }
            logs.line(format!("Pushed {}", reference));
        }
        Ok(())
    }
}
