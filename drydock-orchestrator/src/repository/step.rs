//! Step Repository
//!
//! Handles all database operations related to steps. Status writes are
//! conditional on the expected current status, so racing mutators detect
//! each other instead of overwriting (first-committer-wins).

use drydock_core::domain::step::{Step, StepKind, StepStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Find a step by ID
pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Step>, sqlx::Error> {
    let row = sqlx::query_as::<_, StepRow>(
        r#"
        SELECT id, pipeline_id, order_index, name, kind, command, status, feedback
        FROM steps
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find all steps of a pipeline in execution order
pub async fn find_by_pipeline(
    pool: &SqlitePool,
    pipeline_id: Uuid,
) -> Result<Vec<Step>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StepRow>(
        r#"
        SELECT id, pipeline_id, order_index, name, kind, command, status, feedback
        FROM steps
        WHERE pipeline_id = $1
        ORDER BY order_index ASC
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Conditionally move a step from `from` to `to`.
///
/// Returns whether the row changed; a `false` result means another mutator
/// got there first and the caller must re-read before deciding anything.
pub async fn transition(
    pool: &SqlitePool,
    step_id: Uuid,
    from: StepStatus,
    to: StepStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE steps
        SET status = $1
        WHERE id = $2 AND status = $3
        "#,
    )
    .bind(status_to_string(to))
    .bind(step_id)
    .bind(status_to_string(from))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Attach gate feedback to a step
pub async fn set_feedback(
    pool: &SqlitePool,
    step_id: Uuid,
    feedback: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE steps SET feedback = $1 WHERE id = $2")
        .bind(feedback)
        .bind(step_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Re-activate the original step row for a fresh execution attempt.
///
/// The revision's feedback replaces whatever was attached before; history
/// (tasks and events) stays queryable.
pub async fn reset_to_pending(
    pool: &SqlitePool,
    step_id: Uuid,
    feedback: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE steps SET status = $1, feedback = $2 WHERE id = $3")
        .bind(status_to_string(StepStatus::Pending))
        .bind(feedback)
        .bind(step_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark every step strictly between two order indices invalidated.
///
/// Used by revision: the rewound range keeps its rows and events but drops
/// out of the active execution path.
pub async fn invalidate_range(
    pool: &SqlitePool,
    pipeline_id: Uuid,
    after_index: i64,
    before_index: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE steps
        SET status = $1
        WHERE pipeline_id = $2
          AND order_index > $3
          AND order_index < $4
          AND status != $5
        "#,
    )
    .bind(status_to_string(StepStatus::Invalidated))
    .bind(pipeline_id)
    .bind(after_index)
    .bind(before_index)
    .bind(status_to_string(StepStatus::Invalidated))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Helper Functions
// =============================================================================

pub(crate) fn kind_to_string(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Automated => "Automated",
        StepKind::Gated => "Gated",
    }
}

fn string_to_kind(s: &str) -> StepKind {
    match s {
        "Automated" => StepKind::Automated,
        "Gated" => StepKind::Gated,
        _ => StepKind::Automated,
    }
}

pub(crate) fn status_to_string(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "Pending",
        StepStatus::Running => "Running",
        StepStatus::AwaitingGate => "AwaitingGate",
        StepStatus::Approved => "Approved",
        StepStatus::Rejected => "Rejected",
        StepStatus::Completed => "Completed",
        StepStatus::Failed => "Failed",
        StepStatus::Invalidated => "Invalidated",
    }
}

fn string_to_status(s: &str) -> StepStatus {
    match s {
        "Pending" => StepStatus::Pending,
        "Running" => StepStatus::Running,
        "AwaitingGate" => StepStatus::AwaitingGate,
        "Approved" => StepStatus::Approved,
        "Rejected" => StepStatus::Rejected,
        "Completed" => StepStatus::Completed,
        "Failed" => StepStatus::Failed,
        "Invalidated" => StepStatus::Invalidated,
        _ => StepStatus::Pending,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StepRow {
    id: Uuid,
    pipeline_id: Uuid,
    order_index: i64,
    name: String,
    kind: String,
    command: Option<String>,
    status: String,
    feedback: Option<String>,
}

impl From<StepRow> for Step {
    fn from(row: StepRow) -> Self {
        Step {
            id: row.id,
            pipeline_id: row.pipeline_id,
            order_index: row.order_index,
            name: row.name,
            kind: string_to_kind(&row.kind),
            status: string_to_status(&row.status),
            command: row.command,
            feedback: row.feedback,
        }
    }
}
