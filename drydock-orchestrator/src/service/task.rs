//! Task Service
//!
//! Task reads, cancellation and crash recovery. A running task whose
//! driver is gone beyond the recovery window is failed on the next read —
//! self-healing, no silent stuck states.

use drydock_core::domain::event::EventType;
use drydock_core::domain::pipeline::PipelineStatus;
use drydock_core::domain::step::StepStatus;
use drydock_core::domain::task::{Task, TaskStatus};
use uuid::Uuid;

use crate::repository::{pipeline_repository, step_repository, task_repository};
use crate::service::event::EventError;
use crate::service::event_service;
use crate::service::pipeline::PipelineError;
use crate::state::AppState;

/// Service error type
#[derive(Debug)]
pub enum TaskError {
    NotFound(Uuid),
    InvalidState(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for TaskError {
    fn from(err: sqlx::Error) -> Self {
        TaskError::DatabaseError(err)
    }
}

impl From<EventError> for TaskError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::TaskNotFound(id) => TaskError::NotFound(id),
            EventError::DatabaseError(err) => TaskError::DatabaseError(err),
        }
    }
}

impl From<PipelineError> for TaskError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(id) => {
                TaskError::InvalidState(format!("Pipeline {} not found", id))
            }
            PipelineError::InvalidState(msg) => TaskError::InvalidState(msg),
            PipelineError::Conflict(msg) => TaskError::Conflict(msg),
            PipelineError::ValidationError(msg) => TaskError::InvalidState(msg),
            PipelineError::DatabaseError(err) => TaskError::DatabaseError(err),
        }
    }
}

/// Get a task by ID, reconciling it if its executor is gone
pub async fn get_task(state: &AppState, id: Uuid) -> Result<Task, TaskError> {
    let task = task_repository::find_by_id(&state.pool, id)
        .await?
        .ok_or(TaskError::NotFound(id))?;

    reconcile(state, task).await
}

/// Fail a running task that no executor is driving anymore.
///
/// Invoked from read paths. Only fires once the task has been running
/// longer than the recovery window with no registered driver; the failure
/// is recorded as a synthesized error event and propagated to the owning
/// step and pipeline.
pub async fn reconcile(state: &AppState, task: Task) -> Result<Task, TaskError> {
    if task.status != TaskStatus::Running || state.executor.is_registered(task.id) {
        return Ok(task);
    }

    let started = task.started_at.unwrap_or(task.created_at);
    let age = (chrono::Utc::now() - started).to_std().unwrap_or_default();
    if age < state.executor.recovery_timeout() {
        return Ok(task);
    }

    let Some(step) = step_repository::find_by_id(&state.pool, task.step_id).await? else {
        return Ok(task);
    };

    let lock = state.locks.for_pipeline(step.pipeline_id);
    let _guard = lock.lock().await;

    // Re-check under the lock; a driver or canceller may have finalized it.
    if !task_repository::mark_finished(&state.pool, task.id, TaskStatus::Failed).await? {
        return Ok(task_repository::find_by_id(&state.pool, task.id)
            .await?
            .unwrap_or(task));
    }

    event_service::append(
        &state.pool,
        task.id,
        EventType::Error,
        serde_json::json!({
            "message": "no executor is driving this task; failed by recovery",
        }),
    )
    .await?;

    step_repository::transition(&state.pool, step.id, StepStatus::Running, StepStatus::Failed)
        .await?;
    pipeline_repository::set_status_if_active(
        &state.pool,
        step.pipeline_id,
        PipelineStatus::Failed,
    )
    .await?;

    tracing::warn!("Task {} reconciled as failed after executor loss", task.id);

    Ok(task_repository::find_by_id(&state.pool, task.id)
        .await?
        .unwrap_or(task))
}

/// Cancel an in-flight task.
///
/// Cancellation towards the remote side is best-effort (the remote command
/// may still be running after this returns); local state is finalized
/// regardless and the owning step fails.
pub async fn cancel_task(state: &AppState, task_id: Uuid) -> Result<Task, TaskError> {
    let task = task_repository::find_by_id(&state.pool, task_id)
        .await?
        .ok_or(TaskError::NotFound(task_id))?;

    let step = step_repository::find_by_id(&state.pool, task.step_id)
        .await?
        .ok_or(TaskError::NotFound(task.step_id))?;

    let lock = state.locks.for_pipeline(step.pipeline_id);
    let _guard = lock.lock().await;

    let task = task_repository::find_by_id(&state.pool, task_id)
        .await?
        .ok_or(TaskError::NotFound(task_id))?;

    if task.status.is_terminal() {
        return Err(TaskError::InvalidState(format!(
            "Task {} is already {:?}",
            task_id, task.status
        )));
    }

    state.executor.signal_cancel(task_id);

    if task_repository::mark_finished(&state.pool, task_id, TaskStatus::Cancelled).await? {
        event_service::append(
            &state.pool,
            task_id,
            EventType::StatusChange,
            serde_json::json!({ "status": "cancelled" }),
        )
        .await?;
    }

    step_repository::transition(&state.pool, step.id, StepStatus::Running, StepStatus::Failed)
        .await?;
    pipeline_repository::set_status_if_active(
        &state.pool,
        step.pipeline_id,
        PipelineStatus::Failed,
    )
    .await?;

    tracing::info!("Task {} cancelled", task_id);

    Ok(task_repository::find_by_id(&state.pool, task_id)
        .await?
        .unwrap_or(task))
}
