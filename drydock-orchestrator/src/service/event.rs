//! Event Log Service
//!
//! Append and poll the per-task event log. This is how polling clients
//! reconstruct live progress without a push channel: each client tracks
//! its own last-seen seq and requests only the delta.

use drydock_core::domain::event::{EventType, TaskEvent};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::repository::{event_repository, task_repository};

/// Service error type
#[derive(Debug)]
pub enum EventError {
    TaskNotFound(Uuid),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for EventError {
    fn from(err: sqlx::Error) -> Self {
        EventError::DatabaseError(err)
    }
}

/// Append an event to a task's log, assigning the next seq
pub async fn append(
    pool: &SqlitePool,
    task_id: Uuid,
    event_type: EventType,
    payload: serde_json::Value,
) -> Result<TaskEvent, EventError> {
    let event = event_repository::append(pool, task_id, event_type, payload).await?;

    tracing::debug!(
        "Event {} appended for task {} ({:?})",
        event.seq,
        task_id,
        event_type
    );

    Ok(event)
}

/// List a task's events with seq greater than the caller's watermark
pub async fn list_events(
    pool: &SqlitePool,
    task_id: Uuid,
    after: Option<i64>,
) -> Result<Vec<TaskEvent>, EventError> {
    task_repository::find_by_id(pool, task_id)
        .await?
        .ok_or(EventError::TaskNotFound(task_id))?;

    let events = event_repository::list(pool, task_id, after).await?;
    Ok(events)
}
