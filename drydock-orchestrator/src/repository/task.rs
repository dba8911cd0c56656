//! Task Repository
//!
//! Handles all database operations related to tasks.

use drydock_core::domain::task::{Task, TaskStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Create a new queued task for a step
pub async fn create(pool: &SqlitePool, step_id: Uuid) -> Result<Task, sqlx::Error> {
    let now = chrono::Utc::now();

    let task = Task {
        id: Uuid::new_v4(),
        step_id,
        status: TaskStatus::Queued,
        created_at: now,
        started_at: None,
        finished_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO tasks (id, step_id, status, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(task.id)
    .bind(task.step_id)
    .bind(status_to_string(task.status))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(task)
}

/// Find a task by ID
pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Task>, sqlx::Error> {
    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, step_id, status, created_at, started_at, finished_at
        FROM tasks
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find the step's non-terminal task, if one exists.
///
/// The step state machine creates at most one; this is the double-dispatch
/// guard's lookup.
pub async fn find_active_by_step(
    pool: &SqlitePool,
    step_id: Uuid,
) -> Result<Option<Task>, sqlx::Error> {
    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, step_id, status, created_at, started_at, finished_at
        FROM tasks
        WHERE step_id = $1 AND status IN ('Queued', 'Running')
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(step_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find the step's most recent task across execution attempts
pub async fn find_latest_by_step(
    pool: &SqlitePool,
    step_id: Uuid,
) -> Result<Option<Task>, sqlx::Error> {
    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, step_id, status, created_at, started_at, finished_at
        FROM tasks
        WHERE step_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(step_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Count tasks owned by a step
pub async fn count_by_step(pool: &SqlitePool, step_id: Uuid) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE step_id = $1")
        .bind(step_id)
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

/// Update task status to running and stamp started_at
pub async fn mark_running(pool: &SqlitePool, task_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE tasks
        SET status = $1, started_at = $2
        WHERE id = $3
        "#,
    )
    .bind(status_to_string(TaskStatus::Running))
    .bind(chrono::Utc::now())
    .bind(task_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Move a task into a terminal status and stamp finished_at.
///
/// Conditional on the task still being non-terminal: whichever of the
/// driver, a canceller or recovery commits first wins, the rest see
/// `false` and back off.
pub async fn mark_finished(
    pool: &SqlitePool,
    task_id: Uuid,
    status: TaskStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = $1, finished_at = $2
        WHERE id = $3 AND status IN ('Queued', 'Running')
        "#,
    )
    .bind(status_to_string(status))
    .bind(chrono::Utc::now())
    .bind(task_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Queued => "Queued",
        TaskStatus::Running => "Running",
        TaskStatus::Succeeded => "Succeeded",
        TaskStatus::Failed => "Failed",
        TaskStatus::Cancelled => "Cancelled",
    }
}

fn string_to_status(s: &str) -> TaskStatus {
    match s {
        "Queued" => TaskStatus::Queued,
        "Running" => TaskStatus::Running,
        "Succeeded" => TaskStatus::Succeeded,
        "Failed" => TaskStatus::Failed,
        "Cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Failed,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    step_id: Uuid,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            step_id: row.step_id,
            status: string_to_status(&row.status),
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}
