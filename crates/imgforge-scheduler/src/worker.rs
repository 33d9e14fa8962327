//! Worker that takes build requests off the queue and runs them.

use crate::exclusive::ExclusiveEngine;
use crate::log_bridge::LogBridge;
use crate::queue::JobQueue;
use crate::status::StatusStore;
use chrono::Utc;
use imgforge_config::WorkerConfig;
use imgforge_core::engine::default_platform;
use imgforge_core::{
    BuildEngine, BuildRequest, BuildSpec, BuildStatus, ContextOptions, Error, LogSink, Result,
    StatusUpdate,
};
use rand::Rng;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// What happened to one dequeued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The request was dropped without touching its status record.
    Skipped { image_name: String, reason: String },
    Succeeded { image_name: String },
    Failed { image_name: String, error: String },
}

/// Single build worker. Run exactly one per queue to keep FIFO order.
pub struct Worker {
    queue: JobQueue,
    status: Arc<StatusStore>,
    engine: ExclusiveEngine,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue: JobQueue,
        status: Arc<StatusStore>,
        engine: Arc<dyn BuildEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            status,
            engine: ExclusiveEngine::new(engine),
            config,
        }
    }

    /// Run the worker loop until `shutdown` is cancelled.
    ///
    /// Cancellation is checked between jobs; a build in progress runs to
    /// completion.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(queue = %self.queue.name(), engine = %self.engine.name(), "Starting worker");

        while !shutdown.is_cancelled() {
            match self.process_next().await {
                Ok(Some(outcome)) => debug!(?outcome, "Finished job"),
                Ok(None) => {
                    let backoff = self.idle_backoff();
                    trace!(?backoff, "Queue empty");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.cancelled() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to dequeue build request");
                }
            }
        }

        info!("Worker stopped");
    }

    /// Dequeue and process one request. `Ok(None)` means the queue was empty.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>> {
        let Some(request) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        debug!(image_name = %request.image.name, "Dequeued build request");
        Ok(Some(self.process(request).await))
    }

    /// Build one request and record its terminal status.
    pub async fn process(&self, request: BuildRequest) -> JobOutcome {
        let image_name = request.image.name.clone();

        let current = match self.status.get(&image_name).await {
            Ok(record) => record,
            Err(e) => {
                warn!(image_name = %image_name, error = %e, "Failed to read build status");
                return JobOutcome::Skipped {
                    image_name,
                    reason: e.to_string(),
                };
            }
        };

        // Another worker may have front-run this build.
        if current.status != BuildStatus::Pending {
            debug!(image_name = %image_name, status = %current.status, "Build is not pending, skipping");
            return JobOutcome::Skipped {
                image_name,
                reason: format!("status is {}", current.status),
            };
        }

        info!(image_name = %image_name, "Starting build");
        let (claimed, result) = match self
            .status
            .update(&image_name, StatusUpdate::status(BuildStatus::Building))
            .await
        {
            Ok(_) => (true, self.build(&request).await),
            Err(e) => (false, Err(e)),
        };

        let (status, outcome) = match result {
            Ok(()) => {
                info!(image_name = %image_name, "Build succeeded");
                (
                    BuildStatus::Succeeded,
                    JobOutcome::Succeeded {
                        image_name: image_name.clone(),
                    },
                )
            }
            Err(e) => {
                error!(image_name = %image_name, error = %e, "Build failed");
                (
                    BuildStatus::Failed,
                    JobOutcome::Failed {
                        image_name: image_name.clone(),
                        error: e.to_string(),
                    },
                )
            }
        };

        // Failed is only reachable through Building.
        if !claimed {
            if let Err(e) = self
                .status
                .update(&image_name, StatusUpdate::status(BuildStatus::Building))
                .await
            {
                warn!(image_name = %image_name, error = %e, "Failed to mark build as building");
            }
        }

        let mut update = StatusUpdate::status(status)
            .with_end_time(Utc::now())
            .with_logs(format!("Build finished with status {}\n", status));
        if let JobOutcome::Failed { error, .. } = &outcome {
            update = update.with_error(error.clone());
        }
        if let Err(e) = self.status.update(&image_name, update).await {
            error!(image_name = %image_name, error = %e, "Failed to record build outcome");
        }

        outcome
    }

    async fn build(&self, request: &BuildRequest) -> Result<()> {
        let image_name = &request.image.name;
        let (bridge, deltas) = LogBridge::start(self.config.log_drain_interval);
        let relay = self.spawn_log_relay(image_name.clone(), deltas);

        let result = self.run_engine(request, bridge.sink().clone()).await;

        bridge.stop().await;
        if let Err(e) = relay.await {
            warn!(image_name = %image_name, error = %e, "Log relay ended abnormally");
        }

        result
    }

    async fn run_engine(&self, request: &BuildRequest, logs: LogSink) -> Result<()> {
        let session = self.engine.begin(logs)?;
        let target_dir = self.prepare_context_dir(&request.image.name).await?;

        let options = ContextOptions {
            branch: request.git.branch.clone(),
            single_branch: request.git.single_branch,
            recurse_submodules: request.git.recurse_submodules,
            target_dir,
        };
        let locator = request.context_locator();
        debug!(locator = %locator, "Resolving build context");
        let context = session.resolve_context(&locator, &options).await?;

        let platform = if request.custom_platform.is_empty() {
            default_platform()
        } else {
            request.custom_platform.clone()
        };
        let spec = BuildSpec {
            dockerfile: context.path.join(&request.dockerfile_path),
            context,
            platform,
            build_args: request.build_arg_map()?,
            cache: true,
            destinations: vec![request.destination_ref()],
        };

        let artifact = session.execute_build(&spec).await?;
        session.push(&artifact, &spec).await?;
        Ok(())
    }

    /// Per-build context directory, emptied of anything a previous attempt left.
    async fn prepare_context_dir(&self, image_name: &str) -> Result<PathBuf> {
        let dir = std::path::absolute(self.config.work_dir.join(image_name))
            .map_err(|e| Error::Internal(format!("invalid work dir: {}", e)))?;

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(path = %dir.display(), "Removed stale build context"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Internal(format!(
                    "failed to clear {}: {}",
                    dir.display(),
                    e
                )));
            }
        }
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| Error::Internal(format!("failed to create work dir: {}", e)))?;

        Ok(dir)
    }

    fn spawn_log_relay(
        &self,
        image_name: String,
        mut deltas: mpsc::UnboundedReceiver<String>,
    ) -> JoinHandle<()> {
        let status = self.status.clone();
        tokio::spawn(async move {
            while let Some(delta) = deltas.recv().await {
                if let Err(e) = status.update(&image_name, StatusUpdate::logs(delta)).await {
                    warn!(image_name = %image_name, error = %e, "Failed to append build logs");
                }
            }
        })
    }

    fn idle_backoff(&self) -> Duration {
        jittered_backoff(self.config.poll_backoff_min, self.config.poll_backoff_max)
    }
}

/// A random wait in `[min, max]`. An inverted range collapses to `min`.
fn jittered_backoff(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_stays_within_bounds() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(250);
        for _ in 0..1000 {
            let backoff = jittered_backoff(min, max);
            assert!(backoff >= min && backoff <= max, "{:?} out of range", backoff);
        }
    }

    #[test]
    fn test_backoff_keeps_sub_millisecond_precision() {
        let min = Duration::from_micros(10);
        let max = Duration::from_micros(900);
        for _ in 0..100 {
            let backoff = jittered_backoff(min, max);
            assert!(backoff >= min && backoff <= max);
        }
    }

    #[test]
    fn test_backoff_with_equal_or_inverted_bounds_is_min() {
        let min = Duration::from_millis(50);
        assert_eq!(jittered_backoff(min, min), min);
        assert_eq!(jittered_backoff(min, Duration::from_millis(10)), min);
    }
}
