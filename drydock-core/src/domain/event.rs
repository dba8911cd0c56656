//! Task event domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable, sequence-numbered progress record for a task.
///
/// `seq` is per-task, gapless, starts at 1 and is never reused. Pollers
/// track their own last-seen seq and request only the delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: Uuid,
    pub seq: i64,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    OutputChunk,
    StatusChange,
    Error,
}
