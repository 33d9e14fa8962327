//! Build scheduling for imgforge.
//!
//! Requests are submitted through [`BuildService`], which records a pending
//! status and pushes the request onto a [`JobQueue`]. A single [`Worker`]
//! drains the queue, drives the build engine and streams its log output into
//! the [`StatusStore`].

pub mod exclusive;
pub mod log_bridge;
pub mod queue;
pub mod service;
pub mod status;
pub mod worker;

pub use exclusive::{EngineSession, ExclusiveEngine};
pub use log_bridge::LogBridge;
pub use queue::JobQueue;
pub use service::BuildService;
pub use status::StatusStore;
pub use worker::{JobOutcome, Worker};
