//! CLI command implementations.

pub mod build;
pub mod client;
pub mod status;

use anyhow::{Context, Result};
use imgforge_config::load_service_config;

pub fn validate(path: &str) -> Result<()> {
    let config = load_service_config(path)
        .with_context(|| format!("invalid configuration in {}", path))?;

    println!("Configuration is valid");
    println!("  listen:     {}", config.server.addr);
    println!("  store:      {:?}", config.store.backend);
    println!("  queue:      {}", config.queue.name);
    println!("  status ttl: {}s", config.status.ttl.as_secs());
    println!("  work dir:   {}", config.worker.work_dir.display());
    Ok(())
}
