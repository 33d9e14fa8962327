//! Submission and status lookup for callers outside the worker.

use crate::queue::JobQueue;
use crate::status::StatusStore;
use chrono::Utc;
use imgforge_core::{
    BuildRequest, BuildResult, BuildStatusRecord, RequestDefaults, Result, StatusReport,
};
use std::sync::Arc;
use tracing::info;

/// Front door of the build pipeline.
///
/// `submit` records a pending status before enqueueing, so a status lookup
/// right after submission always finds the build.
#[derive(Clone)]
pub struct BuildService {
    queue: JobQueue,
    status: Arc<StatusStore>,
    defaults: RequestDefaults,
}

impl BuildService {
    pub fn new(queue: JobQueue, status: Arc<StatusStore>, defaults: RequestDefaults) -> Self {
        Self {
            queue,
            status,
            defaults,
        }
    }

    pub async fn submit(&self, request: BuildRequest) -> Result<BuildResult> {
        let request = request.normalize(&self.defaults)?;
        let result = request.result();

        let record = BuildStatusRecord::pending(
            Utc::now(),
            format!("Building image {}:{}\n", result.image_name, result.image_tag),
        );
        self.status.set(&result.image_name, &record).await?;
        self.queue.enqueue(&request).await?;

        info!(
            image_name = %result.image_name,
            image_tag = %result.image_tag,
            "Build submitted"
        );
        Ok(result)
    }

    pub async fn record(&self, image_name: &str) -> Result<BuildStatusRecord> {
        self.status.get(image_name).await
    }

    pub async fn status(&self, image_name: &str) -> Result<StatusReport> {
        Ok(self.record(image_name).await?.into())
    }
}
