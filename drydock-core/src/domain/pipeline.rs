//! Pipeline domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A workflow instance: an ordered, fixed sequence of steps executed against
/// one remote development environment.
///
/// Structure shared between the orchestrator (persists) and clients (poll).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    /// Opaque handle for the target environment, resolved by the session
    /// channel.
    pub env_handle: String,
    pub status: PipelineStatus,
    /// `order_index` of the currently active step.
    pub cursor: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Pipeline lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Running,
    AwaitingGate,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    /// An active pipeline holds exactly one running or gate-parked step and
    /// refuses deletion.
    pub fn is_active(self) -> bool {
        matches!(self, PipelineStatus::Running | PipelineStatus::AwaitingGate)
    }
}
