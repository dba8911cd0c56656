//! Gate decision DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human decision applied to a gate-parked step.
///
/// Not persisted as its own entity; it is a command whose effect is written
/// into the step and pipeline rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub action: GateAction,
    #[serde(default)]
    pub feedback: Option<String>,
    /// Required when `action` is `revise`; must reference an earlier step
    /// of the same pipeline.
    #[serde(default)]
    pub revise_to_step_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    Approve,
    Reject,
    Revise,
}
