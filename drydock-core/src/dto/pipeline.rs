//! Pipeline DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{Pipeline, PipelineStatus};
use crate::domain::step::{Step, StepKind};
use crate::domain::task::Task;

/// Request to launch a workflow against an environment.
///
/// The step order is significant and fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub env_handle: String,
    pub steps: Vec<CreateStep>,
}

/// One step of a workflow launch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStep {
    pub name: String,
    pub kind: StepKind,
    /// Required for automated steps, ignored for gated ones.
    #[serde(default)]
    pub command: Option<String>,
    /// Explicit position. Defaults to the list position when omitted.
    #[serde(default)]
    pub order_index: Option<i64>,
}

/// A pipeline with its ordered steps, each carrying its most recent task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineWithSteps {
    pub pipeline: Pipeline,
    pub steps: Vec<StepDetail>,
}

/// A step together with its most recent task, if it ever ran one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDetail {
    pub step: Step,
    pub task: Option<Task>,
}

/// Condensed pipeline row for the dashboard aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: Uuid,
    pub env_handle: String,
    pub status: PipelineStatus,
    pub cursor: i64,
    pub total_steps: i64,
    pub completed_steps: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
