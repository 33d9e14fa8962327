//! API routes.

pub mod build;
pub mod health;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", build::router())
        .merge(health::router())
        .with_state(state)
}
