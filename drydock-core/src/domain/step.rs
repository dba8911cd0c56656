//! Step domain types and the step state machine
//!
//! Step status is written only through these transitions; the gate
//! controller and the advancement path both go through them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of a pipeline, automated or gated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    /// Position inside the pipeline. Unique per pipeline, assigned at
    /// creation, immutable.
    pub order_index: i64,
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    /// Command executed over the session channel. Present on automated
    /// steps, absent on gated ones.
    pub command: Option<String>,
    /// Reviewer text attached by the gate decision that last touched this
    /// step.
    pub feedback: Option<String>,
}

/// Automated steps run a remote command; gated steps park and wait for a
/// human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Automated,
    Gated,
}

impl StepKind {
    /// Status a step assumes when the cursor reaches it.
    pub fn entry_status(self) -> StepStatus {
        match self {
            StepKind::Automated => StepStatus::Running,
            StepKind::Gated => StepStatus::AwaitingGate,
        }
    }
}

/// Step lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    AwaitingGate,
    Approved,
    Rejected,
    Completed,
    Failed,
    Invalidated,
}

impl StepStatus {
    /// Terminal statuses are never left through the forward machine; a
    /// revision re-activates the original row instead.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Invalidated
        )
    }

    /// The one step the pipeline cursor points at while the pipeline is
    /// active.
    pub fn is_active(self) -> bool {
        matches!(self, StepStatus::Running | StepStatus::AwaitingGate)
    }

    /// Forward edges of the step lifecycle. Revision-driven resets and
    /// invalidation are separate ([`StepStatus::may_invalidate`]).
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, AwaitingGate)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, AwaitingGate)
                | (AwaitingGate, Approved)
                | (AwaitingGate, Rejected)
                | (Approved, Completed)
                | (Rejected, Failed)
        )
    }

    /// Whether a revision rewinding past this step may mark it invalidated.
    /// Completed work inside the rewound range is invalidated with the rest;
    /// an already-invalidated step is left alone.
    pub fn may_invalidate(self) -> bool {
        !matches!(self, StepStatus::Invalidated)
    }
}
