//! Core domain types and traits for imgforge.
//!
//! This crate contains:
//! - Build requests and their submission-time normalization
//! - Build status records and the status merge rules
//! - The build engine boundary trait
//! - The shared store primitive trait
//! - The per-build log buffer and sink

pub mod engine;
pub mod error;
pub mod logs;
pub mod request;
pub mod status;
pub mod store;

pub use engine::{BuildEngine, BuildSpec, ContextOptions, ImageArtifact, SourceContext};
pub use error::{Error, Result};
pub use logs::{LogBuffer, LogSink};
pub use request::{BuildRequest, BuildResult, GitOptions, ImageOptions, RequestDefaults};
pub use status::{BuildStatus, BuildStatusRecord, StatusReport, StatusUpdate, Transition};
pub use store::SharedStore;
