//! Build engine backends for imgforge.
//!
//! Provides the Docker engine: contexts are cloned with `git`, images are
//! built and pushed through the Docker daemon.

pub mod docker;
pub mod git;

pub use docker::DockerEngine;
pub use imgforge_core::engine::{
    BuildEngine, BuildSpec, ContextOptions, ImageArtifact, SourceContext, default_platform,
};
