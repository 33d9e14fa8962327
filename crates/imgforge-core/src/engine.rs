//! Build engine boundary.
//!
//! Engines materialize a build context, build an image from it and push the
//! result. They carry no scheduling logic; every call receives the sink of
//! the build it belongs to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::{LogSink, Result};

/// Options for materializing a build context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextOptions {
    pub branch: String,
    pub single_branch: bool,
    pub recurse_submodules: bool,
    /// Directory the context is materialized into.
    pub target_dir: PathBuf,
}

/// A local, ready-to-build context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub path: PathBuf,
}

/// Normalized build options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub context: SourceContext,
    /// Absolute path of the Dockerfile inside the context.
    pub dockerfile: PathBuf,
    pub platform: String,
    pub build_args: BTreeMap<String, String>,
    pub cache: bool,
    /// Fully qualified references, e.g. `ttl.sh/app:1h`.
    pub destinations: Vec<String>,
}

/// An image produced by [`BuildEngine::execute_build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub id: Option<String>,
    pub references: Vec<String>,
}

/// Trait for image build engines.
///
/// Implementations are not assumed to be reentrant; callers run at most one
/// build against an engine at a time.
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Name of this engine.
    fn name(&self) -> &'static str;

    /// Materialize the source behind `locator` (e.g. `git://host/org/repo`).
    async fn resolve_context(
        &self,
        locator: &str,
        options: &ContextOptions,
        logs: &LogSink,
    ) -> Result<SourceContext>;

    /// Build an image from a resolved context.
    async fn execute_build(&self, spec: &BuildSpec, logs: &LogSink) -> Result<ImageArtifact>;

    /// Publish a built image to its destinations.
    async fn push(&self, artifact: &ImageArtifact, spec: &BuildSpec, logs: &LogSink)
    -> Result<()>;
}

/// Platform of the current host in `os/arch` form, using registry arch names.
pub fn default_platform() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "arm" => "arm",
        "powerpc64" => "ppc64le",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        other => other,
    };
    format!("linux/{}", arch)
}
