//! Gate Controller
//!
//! Validates and applies human decisions against the current step,
//! including revision-driven rewind. Resolution is atomic with respect to
//! the read of the step's status: the claim is a conditional update, so
//! of two racing decisions exactly one commits and the other is told it
//! lost.

use drydock_core::domain::pipeline::PipelineStatus;
use drydock_core::domain::step::{Step, StepStatus};
use drydock_core::dto::gate::{GateAction, GateDecision};
use drydock_core::dto::pipeline::PipelineWithSteps;
use uuid::Uuid;

use crate::repository::{pipeline_repository, step_repository};
use crate::service::pipeline::PipelineError;
use crate::service::pipeline_service;
use crate::state::AppState;

/// Service error type
#[derive(Debug)]
pub enum GateError {
    PipelineNotFound(Uuid),
    StepNotFound(Uuid),
    InvalidState(String),
    Conflict(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for GateError {
    fn from(err: sqlx::Error) -> Self {
        GateError::DatabaseError(err)
    }
}

impl From<PipelineError> for GateError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(id) => GateError::PipelineNotFound(id),
            PipelineError::InvalidState(msg) => GateError::InvalidState(msg),
            PipelineError::Conflict(msg) => GateError::Conflict(msg),
            PipelineError::ValidationError(msg) => GateError::ValidationError(msg),
            PipelineError::DatabaseError(err) => GateError::DatabaseError(err),
        }
    }
}

/// Apply a human decision to a gate-parked step.
///
/// - approve: step completes, the pipeline advances.
/// - reject: step fails, the pipeline fails. Terminal.
/// - revise: the current step and every step strictly between the target
///   and it are invalidated; the target resets to Pending with the
///   decision's feedback attached and re-executes (fresh task for an
///   automated target).
pub async fn handle_gate_decision(
    state: &AppState,
    pipeline_id: Uuid,
    step_id: Uuid,
    decision: GateDecision,
) -> Result<PipelineWithSteps, GateError> {
    let lock = state.locks.for_pipeline(pipeline_id);
    let _guard = lock.lock().await;

    let pipeline = pipeline_repository::find_by_id(&state.pool, pipeline_id)
        .await?
        .ok_or(GateError::PipelineNotFound(pipeline_id))?;

    let step = step_repository::find_by_id(&state.pool, step_id)
        .await?
        .filter(|s| s.pipeline_id == pipeline_id)
        .ok_or(GateError::StepNotFound(step_id))?;

    match decision.action {
        GateAction::Approve => {
            claim_gate(state, &step, StepStatus::Approved).await?;

            if let Some(feedback) = decision.feedback.as_deref() {
                step_repository::set_feedback(&state.pool, step.id, feedback).await?;
            }

            step_repository::transition(
                &state.pool,
                step.id,
                StepStatus::Approved,
                StepStatus::Completed,
            )
            .await?;

            tracing::info!("Gate approved for step {} in pipeline {}", step.id, pipeline_id);

            pipeline_service::advance_locked(state, pipeline_id).await?;
        }
        GateAction::Reject => {
            claim_gate(state, &step, StepStatus::Rejected).await?;

            if let Some(feedback) = decision.feedback.as_deref() {
                step_repository::set_feedback(&state.pool, step.id, feedback).await?;
            }

            step_repository::transition(
                &state.pool,
                step.id,
                StepStatus::Rejected,
                StepStatus::Failed,
            )
            .await?;

            pipeline_repository::set_status(&state.pool, pipeline_id, PipelineStatus::Failed)
                .await?;

            tracing::info!(
                "Gate rejected for step {} in pipeline {}; pipeline failed",
                step.id,
                pipeline_id
            );
        }
        GateAction::Revise => {
            let target_id = decision.revise_to_step_id.ok_or_else(|| {
                GateError::ValidationError(
                    "revise_to_step_id is required when action is revise".to_string(),
                )
            })?;

            let target = step_repository::find_by_id(&state.pool, target_id)
                .await?
                .filter(|s| s.pipeline_id == pipeline_id)
                .ok_or_else(|| {
                    GateError::InvalidState(format!(
                        "Revision target {} is not a step of pipeline {}",
                        target_id, pipeline_id
                    ))
                })?;

            if target.order_index > step.order_index {
                return Err(GateError::InvalidState(format!(
                    "Revision target {} is ahead of the current step; revision only rewinds",
                    target_id
                )));
            }

            claim_gate(state, &step, StepStatus::Invalidated).await?;

            step_repository::invalidate_range(
                &state.pool,
                pipeline_id,
                target.order_index,
                step.order_index,
            )
            .await?;

            step_repository::reset_to_pending(&state.pool, target.id, decision.feedback.as_deref())
                .await?;

            tracing::info!(
                "Pipeline {} rewound from step {} to step {} by revision",
                pipeline_id,
                step.id,
                target.id
            );

            let fresh = step_repository::find_by_id(&state.pool, target.id)
                .await?
                .ok_or(GateError::StepNotFound(target.id))?;

            pipeline_service::activate_step_locked(state, &pipeline, &fresh).await?;
        }
    }

    drop(_guard);

    Ok(pipeline_service::get_pipeline_with_steps(state, pipeline_id).await?)
}

/// Claim the gate by conditionally moving the step out of AwaitingGate.
///
/// First committer wins. On a lost claim the step is re-read to tell a
/// caller that raced another decision (CONFLICT) apart from one that
/// targeted a step never parked at a gate (INVALID_STATE).
async fn claim_gate(state: &AppState, step: &Step, to: StepStatus) -> Result<(), GateError> {
    let claimed =
        step_repository::transition(&state.pool, step.id, StepStatus::AwaitingGate, to).await?;

    if claimed {
        return Ok(());
    }

    let current = step_repository::find_by_id(&state.pool, step.id)
        .await?
        .ok_or(GateError::StepNotFound(step.id))?;

    match current.status {
        StepStatus::Pending | StepStatus::Running => Err(GateError::InvalidState(format!(
            "Step {} is not awaiting a gate decision (current: {:?})",
            step.id, current.status
        ))),
        _ => Err(GateError::Conflict(format!(
            "Gate for step {} was already resolved",
            step.id
        ))),
    }
}
