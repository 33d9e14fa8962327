//! Build submission and status endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use imgforge_core::{BuildRequest, BuildResult, StatusReport};
use tracing::error;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/build", post(submit_build))
        .route("/status/{image_id}", get(build_status))
}

async fn submit_build(
    State(state): State<AppState>,
    payload: Result<Json<BuildRequest>, JsonRejection>,
) -> Result<Json<BuildResult>, ApiError> {
    let Json(request) = payload?;
    let result = state
        .service
        .submit(request)
        .await
        .inspect_err(|e| error!(error = %e, "Build submission failed"))?;
    Ok(Json(result))
}

async fn build_status(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    let report = state.service.status(&image_id).await?;
    Ok(Json(report))
}
