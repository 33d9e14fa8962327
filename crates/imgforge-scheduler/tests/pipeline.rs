use async_trait::async_trait;
use bytes::Bytes;
use imgforge_config::WorkerConfig;
use imgforge_core::engine::default_platform;
use imgforge_core::{
    BuildEngine, BuildRequest, BuildSpec, BuildStatus, ContextOptions, Error, ImageArtifact,
    LogSink, RequestDefaults, Result, SharedStore, SourceContext, StatusUpdate,
};
use imgforge_scheduler::{BuildService, JobOutcome, JobQueue, StatusStore, Worker};
use imgforge_store::MemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeEngine {
    fail_with: Option<String>,
    builds: Mutex<Vec<BuildSpec>>,
    stale_context_seen: Mutex<Vec<bool>>,
}

impl FakeEngine {
    fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    fn builds(&self) -> Vec<BuildSpec> {
        self.builds.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn resolve_context(
        &self,
        locator: &str,
        options: &ContextOptions,
        logs: &LogSink,
    ) -> Result<SourceContext> {
        self.stale_context_seen
            .lock()
            .unwrap()
            .push(options.target_dir.exists());
        logs.line(format!("cloning {}", locator));
        Ok(SourceContext {
            path: options.target_dir.clone(),
        })
    }

    async fn execute_build(&self, spec: &BuildSpec, logs: &LogSink) -> Result<ImageArtifact> {
        self.builds.lock().unwrap().push(spec.clone());
        logs.line("Step 1/1 : FROM scratch");
        if let Some(message) = &self.fail_with {
            return Err(Error::Build(message.clone()));
        }
        Ok(ImageArtifact {
            id: Some("sha256:0123".to_string()),
            references: spec.destinations.clone(),
        })
    }

    async fn push(&self, artifact: &ImageArtifact, _spec: &BuildSpec, logs: &LogSink) -> Result<()> {
        for reference in &artifact.references {
            logs.line(format!("pushed {}", reference));
        }
        Ok(())
    }
}

/// Memory store whose `nth` value write fails once.
struct FlakyStore {
    inner: MemoryStore,
    sets: AtomicUsize,
    fail_on: usize,
}

impl FlakyStore {
    fn failing_set(nth: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            sets: AtomicUsize::new(0),
            fail_on: nth,
        }
    }
}

#[async_trait]
impl SharedStore for FlakyStore {
    async fn push_back(&self, list: &str, payload: Bytes) -> Result<()> {
        self.inner.push_back(list, payload).await
    }

    async fn pop_front(&self, list: &str) -> Result<Option<Bytes>> {
        self.inner.pop_front(list).await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        if self.sets.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(Error::Transport("blip".to_string()));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

struct Harness {
    service: BuildService,
    queue: JobQueue,
    status: Arc<StatusStore>,
    worker: Worker,
    engine: Arc<FakeEngine>,
    work_dir: TempDir,
}

fn harness(engine: FakeEngine) -> Harness {
    harness_with_store(engine, Arc::new(MemoryStore::new()))
}

fn harness_with_store(engine: FakeEngine, store: Arc<dyn SharedStore>) -> Harness {
    let queue = JobQueue::new(store.clone(), "build_queue");
    let status = Arc::new(StatusStore::new(store, Duration::from_secs(3600)));
    let engine = Arc::new(engine);
    let work_dir = TempDir::new().unwrap();

    let config = WorkerConfig {
        work_dir: work_dir.path().to_path_buf(),
        poll_backoff_min: Duration::from_millis(5),
        poll_backoff_max: Duration::from_millis(10),
        log_drain_interval: Duration::from_millis(5),
    };

    Harness {
        service: BuildService::new(queue.clone(), status.clone(), RequestDefaults::default()),
        worker: Worker::new(queue.clone(), status.clone(), engine.clone(), config),
        queue,
        status,
        engine,
        work_dir,
    }
}

#[tokio::test]
async fn test_successful_build_reaches_succeeded() {
    let h = harness(FakeEngine::default());
    let submitted = h
        .service
        .submit(BuildRequest::from_git_url("github.com/org/repo"))
        .await
        .unwrap();

    let outcome = h.worker.process_next().await.unwrap().unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            image_name: submitted.image_name.clone()
        }
    );

    let record = h.service.record(&submitted.image_name).await.unwrap();
    assert_eq!(record.status, BuildStatus::Succeeded);
    assert_eq!(record.error, "");
    assert!(record.end_time.is_some());

    let destination = format!("ttl.sh/{}:1h", submitted.image_name);
    let expected_logs = format!(
        "Building image {name}:1h\n\
         cloning git://github.com/org/repo\n\
         Step 1/1 : FROM scratch\n\
         pushed {destination}\n\
         Build finished with status succeeded\n",
        name = submitted.image_name,
        destination = destination,
    );
    assert_eq!(record.logs, expected_logs);

    let builds = h.engine.builds();
    assert_eq!(builds.len(), 1);
    let spec = &builds[0];
    let context_dir = h.work_dir.path().join(&submitted.image_name);
    assert_eq!(spec.context.path, context_dir);
    assert_eq!(spec.dockerfile, context_dir.join("Dockerfile"));
    assert_eq!(spec.platform, default_platform());
    assert!(spec.cache);
    assert_eq!(spec.destinations, vec![destination]);
}

#[tokio::test]
async fn test_engine_error_is_recorded_verbatim() {
    let h = harness(FakeEngine::failing("boom"));
    let submitted = h
        .service
        .submit(BuildRequest::from_git_url("github.com/org/repo"))
        .await
        .unwrap();

    let outcome = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(outcome, JobOutcome::Failed { ref error, .. } if error == "boom"));

    let report = h.service.status(&submitted.image_name).await.unwrap();
    assert_eq!(report.status, BuildStatus::Failed);
    assert_eq!(report.status_string, "failed");
    assert_eq!(report.error, "boom");
    assert!(report.end_time.is_some());
    assert!(report.logs.contains("Step 1/1 : FROM scratch\n"));
    assert!(report.logs.ends_with("Build finished with status failed\n"));
}

#[tokio::test]
async fn test_failed_building_write_still_ends_failed() {
    // Write 1 is the submit, write 2 the Building transition.
    let h = harness_with_store(FakeEngine::default(), Arc::new(FlakyStore::failing_set(2)));
    let submitted = h
        .service
        .submit(BuildRequest::from_git_url("github.com/org/repo"))
        .await
        .unwrap();

    let outcome = h.worker.process_next().await.unwrap().unwrap();
    assert!(
        matches!(outcome, JobOutcome::Failed { ref error, .. } if error.contains("blip")),
        "{:?}",
        outcome
    );
    assert!(h.engine.builds().is_empty());

    let record = h.service.record(&submitted.image_name).await.unwrap();
    assert_eq!(record.status, BuildStatus::Failed);
    assert!(record.error.contains("blip"));
    assert!(record.end_time.is_some());
    assert!(record.logs.ends_with("Build finished with status failed\n"));
}

#[tokio::test]
async fn test_duplicate_request_is_built_once() {
    let h = harness(FakeEngine::default());
    h.service
        .submit(BuildRequest::from_git_url("github.com/org/repo"))
        .await
        .unwrap();

    let request = h.queue.dequeue().await.unwrap().unwrap();
    h.queue.enqueue(&request).await.unwrap();
    h.queue.enqueue(&request).await.unwrap();

    let first = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(first, JobOutcome::Succeeded { .. }));

    let second = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(second, JobOutcome::Skipped { .. }));

    assert_eq!(h.engine.builds().len(), 1);
    let record = h.service.record(&request.image.name).await.unwrap();
    assert_eq!(record.status, BuildStatus::Succeeded);
}

#[tokio::test]
async fn test_job_already_building_is_left_untouched() {
    let h = harness(FakeEngine::default());
    let submitted = h
        .service
        .submit(BuildRequest::from_git_url("example.com/u/r"))
        .await
        .unwrap();

    // Another worker claimed the job first.
    let claimed = h
        .status
        .update(
            &submitted.image_name,
            StatusUpdate::status(BuildStatus::Building).with_logs("claimed elsewhere\n"),
        )
        .await
        .unwrap();

    let outcome = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(outcome, JobOutcome::Skipped { .. }));
    assert!(h.engine.builds().is_empty());
    assert_eq!(h.service.record(&submitted.image_name).await.unwrap(), claimed);
}

#[tokio::test]
async fn test_request_without_status_is_skipped() {
    let h = harness(FakeEngine::default());
    let request = BuildRequest::from_git_url("github.com/org/repo")
        .normalize(&RequestDefaults::default())
        .unwrap();
    h.queue.enqueue(&request).await.unwrap();

    let outcome = h.worker.process_next().await.unwrap().unwrap();
    assert!(matches!(outcome, JobOutcome::Skipped { .. }));
    assert!(h.engine.builds().is_empty());
    assert!(matches!(
        h.service.record(&request.image.name).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_empty_queue_processes_nothing() {
    let h = harness(FakeEngine::default());
    assert!(h.worker.process_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_stale_context_is_removed_before_resolving() {
    let h = harness(FakeEngine::default());
    let mut request = BuildRequest::from_git_url("github.com/org/repo");
    request.image.name = "reused".to_string();
    h.service.submit(request).await.unwrap();

    let stale = h.work_dir.path().join("reused");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("leftover"), "old").unwrap();

    h.worker.process_next().await.unwrap().unwrap();
    assert_eq!(*h.engine.stale_context_seen.lock().unwrap(), vec![false]);
}

#[tokio::test]
async fn test_request_options_reach_the_engine() {
    let h = harness(FakeEngine::default());
    let mut request = BuildRequest::from_git_url("github.com/org/repo");
    request.custom_platform = "linux/arm64".to_string();
    request.dockerfile_path = "docker/Dockerfile.prod".to_string();
    request.image.destination = "registry.local:5000".to_string();
    request.image.tag = "v2".to_string();
    request.build_args = vec!["VERSION=2".to_string()];
    let submitted = h.service.submit(request).await.unwrap();

    h.worker.process_next().await.unwrap().unwrap();

    let spec = h.engine.builds().remove(0);
    assert_eq!(spec.platform, "linux/arm64");
    assert!(spec.dockerfile.ends_with("docker/Dockerfile.prod"));
    assert_eq!(spec.build_args.get("VERSION").map(String::as_str), Some("2"));
    assert_eq!(
        spec.destinations,
        vec![format!("registry.local:5000/{}:v2", submitted.image_name)]
    );
}

#[tokio::test]
async fn test_run_loop_builds_until_cancelled() {
    let h = harness(FakeEngine::default());
    let worker = Arc::new(h.worker);
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn({
        let worker = worker.clone();
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    let submitted = h
        .service
        .submit(BuildRequest::from_git_url("github.com/org/repo"))
        .await
        .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = h.service.record(&submitted.image_name).await.unwrap();
            if record.status.is_terminal() {
                return record.status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(status, BuildStatus::Succeeded);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
