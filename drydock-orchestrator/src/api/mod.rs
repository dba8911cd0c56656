//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod gate;
pub mod health;
pub mod pipeline;
pub mod task;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipelines", post(pipeline::create_pipeline))
        .route("/pipelines", get(pipeline::list_pipelines))
        .route("/pipelines/{id}", get(pipeline::get_pipeline))
        .route("/pipelines/{id}", delete(pipeline::delete_pipeline))
        .route("/pipelines/{id}/cancel", post(pipeline::cancel_pipeline))
        // Gate endpoint
        .route(
            "/pipelines/{id}/steps/{step_id}/gate",
            post(gate::submit_gate_decision),
        )
        // Task endpoints
        .route("/tasks/{task_id}", get(task::get_task))
        .route("/tasks/{task_id}/cancel", post(task::cancel_task))
        .route("/tasks/{task_id}/events", get(task::list_task_events))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
