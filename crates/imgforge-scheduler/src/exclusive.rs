//! Single-active-build guard around a build engine.

use imgforge_core::{
    BuildEngine, BuildSpec, ContextOptions, Error, ImageArtifact, LogSink, Result, SourceContext,
};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Wraps an engine so that at most one build session exists at a time.
///
/// Engines are not reentrant and log capture is scoped to one build, so a
/// second session is refused rather than queued.
pub struct ExclusiveEngine {
    engine: Arc<dyn BuildEngine>,
    active: Mutex<()>,
}

/// One build's exclusive use of the engine, bound to that build's log sink.
pub struct EngineSession<'a> {
    engine: &'a dyn BuildEngine,
    logs: LogSink,
    _active: MutexGuard<'a, ()>,
}

impl ExclusiveEngine {
    pub fn new(engine: Arc<dyn BuildEngine>) -> Self {
        Self {
            engine,
            active: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.engine.name()
    }

    /// Open a session, failing with `EngineBusy` if another build holds one.
    pub fn begin(&self, logs: LogSink) -> Result<EngineSession<'_>> {
        let guard = self.active.try_lock().map_err(|_| {
            Error::EngineBusy(format!("{} engine already has an active build", self.name()))
        })?;
        Ok(EngineSession {
            engine: self.engine.as_ref(),
            logs,
            _active: guard,
        })
    }
}

impl EngineSession<'_> {
    pub fn logs(&self) -> &LogSink {
        &self.logs
    }

    pub async fn resolve_context(
        &self,
        locator: &str,
        options: &ContextOptions,
    ) -> Result<SourceContext> {
        self.engine
            .resolve_context(locator, options, &self.logs)
            .await
    }

    pub async fn execute_build(&self, spec: &BuildSpec) -> Result<ImageArtifact> {
        self.engine.execute_build(spec, &self.logs).await
    }

    pub async fn push(&self, artifact: &ImageArtifact, spec: &BuildSpec) -> Result<()> {
        self.engine.push(artifact, spec, &self.logs).await
    }
}
