//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline lifecycle management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use drydock_core::domain::pipeline::Pipeline;
use drydock_core::dto::pipeline::{CreatePipeline, PipelineSummary, PipelineWithSteps};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::pipeline_service;
use crate::state::AppState;

/// POST /pipelines
/// Launch a workflow against an environment
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<CreatePipeline>,
) -> ApiResult<(StatusCode, Json<PipelineWithSteps>)> {
    tracing::info!("Creating pipeline against environment: {}", req.env_handle);

    let pipeline = pipeline_service::create_pipeline(&state, req)
        .await
        .map_err(|e| match e {
            pipeline_service::PipelineError::ValidationError(msg) => ApiError::BadRequest(msg),
            pipeline_service::PipelineError::NotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            pipeline_service::PipelineError::InvalidState(msg) => ApiError::InvalidState(msg),
            pipeline_service::PipelineError::Conflict(msg) => ApiError::Conflict(msg),
            pipeline_service::PipelineError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /pipelines
/// List pipeline summaries for the dashboard
pub async fn list_pipelines(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PipelineSummary>>> {
    tracing::debug!("Listing all pipelines");

    let pipelines = pipeline_service::list_pipelines(&state)
        .await
        .map_err(|e| match e {
            pipeline_service::PipelineError::NotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            pipeline_service::PipelineError::ValidationError(msg) => ApiError::BadRequest(msg),
            pipeline_service::PipelineError::InvalidState(msg) => ApiError::InvalidState(msg),
            pipeline_service::PipelineError::Conflict(msg) => ApiError::Conflict(msg),
            pipeline_service::PipelineError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok(Json(pipelines))
}

/// GET /pipelines/{id}
/// Get a pipeline with its steps in order
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineWithSteps>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = pipeline_service::get_pipeline_with_steps(&state, id)
        .await
        .map_err(|e| match e {
            pipeline_service::PipelineError::NotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            pipeline_service::PipelineError::ValidationError(msg) => ApiError::BadRequest(msg),
            pipeline_service::PipelineError::InvalidState(msg) => ApiError::InvalidState(msg),
            pipeline_service::PipelineError::Conflict(msg) => ApiError::Conflict(msg),
            pipeline_service::PipelineError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok(Json(pipeline))
}

/// DELETE /pipelines/{id}
/// Delete a pipeline that is no longer active
pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting pipeline: {}", id);

    pipeline_service::delete_pipeline(&state, id)
        .await
        .map_err(|e| match e {
            pipeline_service::PipelineError::NotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            pipeline_service::PipelineError::ValidationError(msg) => ApiError::BadRequest(msg),
            pipeline_service::PipelineError::InvalidState(msg) => ApiError::InvalidState(msg),
            pipeline_service::PipelineError::Conflict(msg) => ApiError::Conflict(msg),
            pipeline_service::PipelineError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok(StatusCode::OK)
}

/// POST /pipelines/{id}/cancel
/// Cancel an active pipeline
pub async fn cancel_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Cancelling pipeline: {}", id);

    let pipeline = pipeline_service::cancel_pipeline(&state, id)
        .await
        .map_err(|e| match e {
            pipeline_service::PipelineError::NotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            pipeline_service::PipelineError::ValidationError(msg) => ApiError::BadRequest(msg),
            pipeline_service::PipelineError::InvalidState(msg) => ApiError::InvalidState(msg),
            pipeline_service::PipelineError::Conflict(msg) => ApiError::Conflict(msg),
            pipeline_service::PipelineError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok(Json(pipeline))
}
