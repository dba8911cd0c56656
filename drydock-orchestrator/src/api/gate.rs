//! Gate API Handler
//!
//! HTTP endpoint for resolving gate-parked steps.

use axum::{
    Json,
    extract::{Path, State},
};
use drydock_core::dto::gate::GateDecision;
use drydock_core::dto::pipeline::PipelineWithSteps;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::gate_service;
use crate::state::AppState;

/// POST /pipelines/{id}/steps/{step_id}/gate
/// Apply a human decision (approve / reject / revise) to a gated step
pub async fn submit_gate_decision(
    State(state): State<AppState>,
    Path((pipeline_id, step_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<PipelineWithSteps>> {
    // A missing or unknown action is the caller's mistake, not a state
    // problem; decode by hand so it surfaces as 400.
    let decision: GateDecision = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid gate decision: {}", e)))?;

    tracing::info!(
        "Gate decision {:?} for step {} in pipeline {}",
        decision.action,
        step_id,
        pipeline_id
    );

    let pipeline = gate_service::handle_gate_decision(&state, pipeline_id, step_id, decision)
        .await
        .map_err(|e| match e {
            gate_service::GateError::PipelineNotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            gate_service::GateError::StepNotFound(id) => {
                ApiError::NotFound(format!("Step {} not found", id))
            }
            gate_service::GateError::InvalidState(msg) => ApiError::InvalidState(msg),
            gate_service::GateError::Conflict(msg) => ApiError::Conflict(msg),
            gate_service::GateError::ValidationError(msg) => ApiError::BadRequest(msg),
            gate_service::GateError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok(Json(pipeline))
}
