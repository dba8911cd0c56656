//! Task API Handlers
//!
//! HTTP endpoints for task reads, cancellation and event polling.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use drydock_core::domain::task::Task;
use drydock_core::dto::event::EventsResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::{event_service, task_service};
use crate::state::AppState;

/// GET /tasks/{task_id}
/// Get task details by ID
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    tracing::debug!("Getting task: {}", task_id);

    let task = task_service::get_task(&state, task_id)
        .await
        .map_err(|e| match e {
            task_service::TaskError::NotFound(id) => {
                ApiError::NotFound(format!("Task {} not found", id))
            }
            task_service::TaskError::InvalidState(msg) => ApiError::InvalidState(msg),
            task_service::TaskError::Conflict(msg) => ApiError::Conflict(msg),
            task_service::TaskError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok(Json(task))
}

/// POST /tasks/{task_id}/cancel
/// Cancel an in-flight task
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    tracing::info!("Cancelling task: {}", task_id);

    let task = task_service::cancel_task(&state, task_id)
        .await
        .map_err(|e| match e {
            task_service::TaskError::NotFound(id) => {
                ApiError::NotFound(format!("Task {} not found", id))
            }
            task_service::TaskError::InvalidState(msg) => ApiError::InvalidState(msg),
            task_service::TaskError::Conflict(msg) => ApiError::Conflict(msg),
            task_service::TaskError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok(Json(task))
}

/// Query parameters for the event poll endpoint
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Last seq the caller has already seen
    pub after: Option<i64>,
}

/// GET /tasks/{task_id}/events?after={seq}
/// List a task's events after the caller's watermark, in ascending seq order
pub async fn list_task_events(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Query(params): Query<EventsQuery>,
) -> ApiResult<Json<EventsResponse>> {
    tracing::debug!("Listing events for task {} after {:?}", task_id, params.after);

    // Reads reconcile: a task whose executor died is failed here before
    // its events are served.
    task_service::get_task(&state, task_id)
        .await
        .map_err(|e| match e {
            task_service::TaskError::NotFound(id) => {
                ApiError::NotFound(format!("Task {} not found", id))
            }
            task_service::TaskError::InvalidState(msg) => ApiError::InvalidState(msg),
            task_service::TaskError::Conflict(msg) => ApiError::Conflict(msg),
            task_service::TaskError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    let events = event_service::list_events(&state.pool, task_id, params.after)
        .await
        .map_err(|e| match e {
            event_service::EventError::TaskNotFound(id) => {
                ApiError::NotFound(format!("Task {} not found", id))
            }
            event_service::EventError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok(Json(EventsResponse { events }))
}
