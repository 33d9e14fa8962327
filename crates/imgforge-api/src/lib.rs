//! HTTP API server for imgforge.
//!
//! Exposes build submission and status lookup over REST.

pub mod error;
pub mod routes;
pub mod shutdown;
pub mod state;

pub use state::AppState;
