//! Pipeline Engine
//!
//! Owns the ordered step collection and the execution cursor; orchestrates
//! advancement, deletion and failure propagation. Steps execute strictly
//! in order-index order except when a revision sets the cursor backward.

use drydock_core::domain::pipeline::{Pipeline, PipelineStatus};
use drydock_core::domain::step::{Step, StepKind, StepStatus};
use drydock_core::domain::task::TaskStatus;
use drydock_core::dto::pipeline::{CreatePipeline, PipelineSummary, PipelineWithSteps, StepDetail};
use uuid::Uuid;

use crate::repository::pipeline::NewStep;
use crate::repository::{pipeline_repository, step_repository, task_repository};
use crate::service::event_service;
use crate::service::task::TaskError;
use crate::service::task_service;
use crate::state::AppState;
use drydock_core::domain::event::EventType;

/// Service error type
#[derive(Debug)]
pub enum PipelineError {
    NotFound(Uuid),
    InvalidState(String),
    Conflict(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::DatabaseError(err)
    }
}

impl From<TaskError> for PipelineError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(id) => PipelineError::NotFound(id),
            TaskError::InvalidState(msg) => PipelineError::InvalidState(msg),
            TaskError::Conflict(msg) => PipelineError::Conflict(msg),
            TaskError::DatabaseError(err) => PipelineError::DatabaseError(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Launch a workflow: persist the pipeline and its steps, then activate
/// the first step.
pub async fn create_pipeline(state: &AppState, req: CreatePipeline) -> Result<PipelineWithSteps> {
    let specs = normalize_steps(&req)?;

    let (pipeline, steps) = pipeline_repository::create(&state.pool, &req.env_handle, specs).await?;

    tracing::info!(
        "Pipeline {} created against environment {} ({} steps)",
        pipeline.id,
        pipeline.env_handle,
        steps.len()
    );

    {
        let lock = state.locks.for_pipeline(pipeline.id);
        let _guard = lock.lock().await;

        if let Some(first) = steps.first() {
            activate_step_locked(state, &pipeline, first).await?;
        }
    }

    get_pipeline_with_steps(state, pipeline.id).await
}

/// Get a pipeline with its steps in order, each carrying its most recent
/// task. Stale running tasks are reconciled on this read path.
pub async fn get_pipeline_with_steps(state: &AppState, id: Uuid) -> Result<PipelineWithSteps> {
    let mut passes = 0;

    loop {
        passes += 1;

        let pipeline = pipeline_repository::find_by_id(&state.pool, id)
            .await?
            .ok_or(PipelineError::NotFound(id))?;
        let steps = step_repository::find_by_pipeline(&state.pool, id).await?;

        let mut healed = false;
        let mut details = Vec::with_capacity(steps.len());

        for step in steps {
            let task = match task_repository::find_latest_by_step(&state.pool, step.id).await? {
                Some(found) => {
                    let before = found.status;
                    let current = task_service::reconcile(state, found).await?;
                    healed |= current.status != before;
                    Some(current)
                }
                None => None,
            };
            details.push(StepDetail { step, task });
        }

        // Recovery rewrote step or pipeline rows; serve the healed state.
        if healed && passes < 2 {
            continue;
        }

        return Ok(PipelineWithSteps {
            pipeline,
            steps: details,
        });
    }
}

/// List condensed pipeline rows for the dashboard aggregator
pub async fn list_pipelines(state: &AppState) -> Result<Vec<PipelineSummary>> {
    let summaries = pipeline_repository::list_summaries(&state.pool).await?;
    Ok(summaries)
}

/// Delete a pipeline and everything it owns.
///
/// Refused while the pipeline is active; callers must finish or cancel it
/// first.
pub async fn delete_pipeline(state: &AppState, id: Uuid) -> Result<()> {
    let lock = state.locks.for_pipeline(id);
    let _guard = lock.lock().await;

    let pipeline = pipeline_repository::find_by_id(&state.pool, id)
        .await?
        .ok_or(PipelineError::NotFound(id))?;

    if pipeline.status.is_active() {
        return Err(PipelineError::InvalidState(format!(
            "Cannot delete pipeline {} in state {:?}",
            id, pipeline.status
        )));
    }

    let deleted = pipeline_repository::delete(&state.pool, id).await?;
    if !deleted {
        return Err(PipelineError::NotFound(id));
    }

    drop(_guard);
    state.locks.forget(id);

    tracing::info!("Pipeline deleted: {}", id);

    Ok(())
}

/// Cancel an active pipeline.
///
/// The in-flight task (if any) is cancelled best-effort, a parked gate
/// step is invalidated, and the pipeline records Cancelled.
pub async fn cancel_pipeline(state: &AppState, id: Uuid) -> Result<Pipeline> {
    let lock = state.locks.for_pipeline(id);
    let _guard = lock.lock().await;

    let pipeline = pipeline_repository::find_by_id(&state.pool, id)
        .await?
        .ok_or(PipelineError::NotFound(id))?;

    if !pipeline.status.is_active() {
        return Err(PipelineError::InvalidState(format!(
            "Cannot cancel pipeline {} in state {:?}",
            id, pipeline.status
        )));
    }

    pipeline_repository::set_status(&state.pool, id, PipelineStatus::Cancelled).await?;

    let steps = step_repository::find_by_pipeline(&state.pool, id).await?;

    if let Some(active) = steps.iter().find(|s| s.status.is_active()) {
        match active.status {
            StepStatus::AwaitingGate => {
                step_repository::transition(
                    &state.pool,
                    active.id,
                    StepStatus::AwaitingGate,
                    StepStatus::Invalidated,
                )
                .await?;
            }
            StepStatus::Running => {
                if let Some(task) = task_repository::find_active_by_step(&state.pool, active.id)
                    .await?
                {
                    state.executor.signal_cancel(task.id);
                    if task_repository::mark_finished(&state.pool, task.id, TaskStatus::Cancelled)
                        .await?
                    {
                        if let Err(e) = event_service::append(
                            &state.pool,
                            task.id,
                            EventType::StatusChange,
                            serde_json::json!({ "status": "cancelled" }),
                        )
                        .await
                        {
                            tracing::error!(
                                "Task {}: failed to append cancel event: {:?}",
                                task.id,
                                e
                            );
                        }
                    }
                }
                step_repository::transition(
                    &state.pool,
                    active.id,
                    StepStatus::Running,
                    StepStatus::Failed,
                )
                .await?;
            }
            _ => {}
        }
    }

    tracing::info!("Pipeline {} cancelled", id);

    let pipeline = pipeline_repository::find_by_id(&state.pool, id)
        .await?
        .ok_or(PipelineError::NotFound(id))?;

    Ok(pipeline)
}

/// Move the cursor past a successfully finished step.
///
/// The next Pending step is the target; invalidated steps are excluded
/// from the active path. No Pending step left means the pipeline is
/// complete. Caller must hold the pipeline lock.
pub async fn advance_locked(state: &AppState, pipeline_id: Uuid) -> Result<()> {
    let pipeline = pipeline_repository::find_by_id(&state.pool, pipeline_id)
        .await?
        .ok_or(PipelineError::NotFound(pipeline_id))?;

    if !pipeline.status.is_active() {
        return Ok(());
    }

    let steps = step_repository::find_by_pipeline(&state.pool, pipeline_id).await?;
    let next = steps
        .iter()
        .find(|s| s.order_index > pipeline.cursor && s.status == StepStatus::Pending);

    match next {
        Some(step) => activate_step_locked(state, &pipeline, step).await,
        None => {
            pipeline_repository::set_status(&state.pool, pipeline_id, PipelineStatus::Completed)
                .await?;
            tracing::info!("Pipeline {} completed", pipeline_id);
            Ok(())
        }
    }
}

/// Put the cursor on `step` and enter it: automated steps start a task,
/// gated steps park awaiting a decision. Caller must hold the pipeline
/// lock.
pub async fn activate_step_locked(
    state: &AppState,
    pipeline: &Pipeline,
    step: &Step,
) -> Result<()> {
    let entry = step.kind.entry_status();

    if !step.status.can_transition_to(entry) {
        return Err(PipelineError::InvalidState(format!(
            "Step {} cannot enter {:?} from {:?}",
            step.id, entry, step.status
        )));
    }

    if !step_repository::transition(&state.pool, step.id, step.status, entry).await? {
        return Err(PipelineError::Conflict(format!(
            "Step {} changed status during activation",
            step.id
        )));
    }

    let pipeline_status = match step.kind {
        StepKind::Automated => PipelineStatus::Running,
        StepKind::Gated => PipelineStatus::AwaitingGate,
    };
    pipeline_repository::set_cursor_and_status(
        &state.pool,
        pipeline.id,
        step.order_index,
        pipeline_status,
    )
    .await?;

    match step.kind {
        StepKind::Gated => {
            tracing::info!(
                "Step {} ({}) awaiting gate in pipeline {}",
                step.id,
                step.name,
                pipeline.id
            );
        }
        StepKind::Automated => {
            let mut running = step.clone();
            running.status = entry;
            let task = state.executor.start(pipeline, &running).await?;
            tracing::info!(
                "Step {} ({}) running task {} in pipeline {}",
                step.id,
                step.name,
                task.id,
                pipeline.id
            );
        }
    }

    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

fn normalize_steps(req: &CreatePipeline) -> Result<Vec<NewStep>> {
    if req.env_handle.trim().is_empty() {
        return Err(PipelineError::ValidationError(
            "Environment handle cannot be empty".to_string(),
        ));
    }

    if req.steps.is_empty() {
        return Err(PipelineError::ValidationError(
            "Step list cannot be empty".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    let mut specs = Vec::with_capacity(req.steps.len());

    for (position, step) in req.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(PipelineError::ValidationError(format!(
                "Step at position {} has an empty name",
                position
            )));
        }

        let order_index = step.order_index.unwrap_or(position as i64);
        if !seen.insert(order_index) {
            return Err(PipelineError::ValidationError(format!(
                "Duplicate order index {}",
                order_index
            )));
        }

        let command = match step.kind {
            StepKind::Automated => {
                let command = step.command.as_deref().map(str::trim).unwrap_or_default();
                if command.is_empty() {
                    return Err(PipelineError::ValidationError(format!(
                        "Automated step '{}' requires a command",
                        step.name
                    )));
                }
                Some(command.to_string())
            }
            StepKind::Gated => None,
        };

        specs.push(NewStep {
            order_index,
            name: step.name.clone(),
            kind: step.kind,
            command,
        });
    }

    specs.sort_by_key(|s| s.order_index);

    Ok(specs)
}
