//! KDL configuration parsing for imgforge.
//!
//! This crate handles parsing of the service configuration (imgforge.kdl).

pub mod error;
pub mod service;

pub use error::{ConfigError, ConfigResult};
pub use service::{
    LoggingConfig, QueueConfig, ServerConfig, ServiceConfig, StatusConfig, StoreBackend,
    StoreConfig, WorkerConfig, load_service_config, parse_service_config,
};
