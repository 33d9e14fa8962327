//! imgforge API server

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use imgforge_api::shutdown::install_shutdown_handler;
use imgforge_api::{AppState, routes};
use imgforge_config::{
    LoggingConfig, ServiceConfig, StoreBackend, StoreConfig, load_service_config,
};
use imgforge_core::SharedStore;
use imgforge_engine::DockerEngine;
use imgforge_scheduler::{BuildService, JobQueue, StatusStore, Worker};
use imgforge_store::{MemoryStore, PgStore, create_pool, run_migrations};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "imgforge-server")]
#[command(about = "Container image build service", version)]
struct Args {
    /// Path to the KDL service configuration
    #[arg(short, long, env = "IMGFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to serve on, e.g. 0.0.0.0:9007
    #[arg(long)]
    addr: Option<String>,

    /// Origin allowed by CORS
    #[arg(long)]
    origin_allowed: Option<String>,

    /// Log level filter, used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => load_service_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        if let Some(addr) = &self.addr {
            config.server.addr = addr.clone();
        }
        if let Some(origin) = &self.origin_allowed {
            config.server.origin_allowed = origin.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(url) = &self.database_url {
            config.store.url = url.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    init_tracing(&config.logging);

    let shutdown = install_shutdown_handler().context("failed to install signal handlers")?;
    let store = connect_store(&config.store, &shutdown).await?;

    let queue = JobQueue::new(store.clone(), config.queue.name.clone());
    let status = Arc::new(StatusStore::new(store.clone(), config.status.ttl));
    let service = BuildService::new(queue.clone(), status.clone(), config.defaults.clone());

    let engine = DockerEngine::new().context("failed to create docker client")?;
    if let Err(e) = engine.ping().await {
        warn!(error = %e, "Docker daemon is not reachable yet");
    }

    let worker = Worker::new(queue, status, Arc::new(engine), config.worker.clone());
    let worker_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    let app = routes::router(AppState::new(service, store))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server.origin_allowed)?);

    let listener = TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.addr))?;
    info!(addr = %config.server.addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    info!("Waiting for the worker to finish its current build");
    worker_handle.await?;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect_store(
    config: &StoreConfig,
    shutdown: &CancellationToken,
) -> anyhow::Result<Arc<dyn SharedStore>> {
    match config.backend {
        StoreBackend::Postgres => {
            info!("Connecting to database...");
            let pool = create_pool(&config.url, config.max_connections)
                .await
                .context("failed to connect to database")?;
            run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            info!("Database connected");

            let store = Arc::new(PgStore::new(pool));
            tokio::spawn({
                let store = store.clone();
                let shutdown = shutdown.clone();
                async move {
                    let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => match store.purge_expired().await {
                                Ok(purged) => debug!(purged, "Purged expired values"),
                                Err(e) => warn!(error = %e, "Failed to purge expired values"),
                            },
                            _ = shutdown.cancelled() => return,
                        }
                    }
                }
            });
            Ok(store)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; queued builds and statuses are lost on restart");
            let store = Arc::new(MemoryStore::new());
            tokio::spawn({
                let store = store.clone();
                let shutdown = shutdown.clone();
                async move {
                    let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                let purged = store.purge_expired().await;
                                debug!(purged, "Purged expired values");
                            }
                            _ = shutdown.cancelled() => return,
                        }
                    }
                }
            });
            Ok(store)
        }
    }
}

fn cors_layer(origin_allowed: &str) -> anyhow::Result<CorsLayer> {
    let origin = if origin_allowed == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(origin_allowed)
            .with_context(|| format!("invalid CORS origin {}", origin_allowed))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any))
}
