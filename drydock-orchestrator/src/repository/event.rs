//! Event Repository
//!
//! Append-only, per-task sequenced event log. `seq` starts at 1, is
//! strictly increasing and gapless: the next value is computed inside the
//! insert statement itself, so no interleaving of appenders can skip or
//! reuse a number, and UNIQUE(task_id, seq) backstops the invariant.

use drydock_core::domain::event::{EventType, TaskEvent};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Append an event, assigning the task's next seq.
///
/// Durable before this returns; a poller can never observe a seq that a
/// crash later un-happens.
pub async fn append(
    pool: &SqlitePool,
    task_id: Uuid,
    event_type: EventType,
    payload: serde_json::Value,
) -> Result<TaskEvent, sqlx::Error> {
    let now = chrono::Utc::now();

    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO task_events (task_id, seq, event_type, payload, timestamp)
        SELECT $1,
               COALESCE((SELECT MAX(seq) FROM task_events WHERE task_id = $2), 0) + 1,
               $3, $4, $5
        RETURNING seq
        "#,
    )
    .bind(task_id)
    .bind(task_id)
    .bind(type_to_string(event_type))
    .bind(payload.to_string())
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(TaskEvent {
        task_id,
        seq: row.0,
        event_type,
        payload,
        timestamp: now,
    })
}

/// List events with `seq > after` in ascending seq order.
///
/// Read-only and idempotent; pollers call this with their own watermark.
pub async fn list(
    pool: &SqlitePool,
    task_id: Uuid,
    after: Option<i64>,
) -> Result<Vec<TaskEvent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT task_id, seq, event_type, payload, timestamp
        FROM task_events
        WHERE task_id = $1 AND seq > $2
        ORDER BY seq ASC
        "#,
    )
    .bind(task_id)
    .bind(after.unwrap_or(0))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Count events for a task
pub async fn count_by_task(pool: &SqlitePool, task_id: Uuid) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_events WHERE task_id = $1")
        .bind(task_id)
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn type_to_string(event_type: EventType) -> &'static str {
    match event_type {
        EventType::OutputChunk => "output-chunk",
        EventType::StatusChange => "status-change",
        EventType::Error => "error",
    }
}

fn string_to_type(s: &str) -> EventType {
    match s {
        "output-chunk" => EventType::OutputChunk,
        "status-change" => EventType::StatusChange,
        "error" => EventType::Error,
        _ => EventType::StatusChange,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct EventRow {
    task_id: Uuid,
    seq: i64,
    event_type: String,
    payload: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<EventRow> for TaskEvent {
    fn from(row: EventRow) -> Self {
        let payload = serde_json::from_str(&row.payload).unwrap_or(serde_json::Value::Null);

        TaskEvent {
            task_id: row.task_id,
            seq: row.seq,
            event_type: string_to_type(&row.event_type),
            payload,
            timestamp: row.timestamp,
        }
    }
}
