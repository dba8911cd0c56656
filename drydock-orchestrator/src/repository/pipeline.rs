//! Pipeline Repository
//!
//! Handles all database operations related to pipelines.

use drydock_core::domain::pipeline::{Pipeline, PipelineStatus};
use drydock_core::domain::step::{Step, StepKind, StepStatus};
use drydock_core::dto::pipeline::PipelineSummary;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::repository::step::{kind_to_string, status_to_string as step_status_to_string};

/// Normalized step definition ready for insertion.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub order_index: i64,
    pub name: String,
    pub kind: StepKind,
    pub command: Option<String>,
}

/// Create a pipeline together with its steps in one transaction.
///
/// All steps are persisted `Pending`; the caller activates the first one
/// under the pipeline lock. The cursor starts at the first step's index.
pub async fn create(
    pool: &SqlitePool,
    env_handle: &str,
    steps: Vec<NewStep>,
) -> Result<(Pipeline, Vec<Step>), sqlx::Error> {
    let now = chrono::Utc::now();
    let cursor = steps.first().map(|s| s.order_index).unwrap_or(0);

    let pipeline = Pipeline {
        id: Uuid::new_v4(),
        env_handle: env_handle.to_string(),
        status: PipelineStatus::Running,
        cursor,
        created_at: now,
        updated_at: now,
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO pipelines (id, env_handle, status, cursor, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(pipeline.id)
    .bind(&pipeline.env_handle)
    .bind(status_to_string(pipeline.status))
    .bind(pipeline.cursor)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let mut created = Vec::with_capacity(steps.len());

    for spec in steps {
        let step = Step {
            id: Uuid::new_v4(),
            pipeline_id: pipeline.id,
            order_index: spec.order_index,
            name: spec.name,
            kind: spec.kind,
            status: StepStatus::Pending,
            command: spec.command,
            feedback: None,
        };

        sqlx::query(
            r#"
            INSERT INTO steps (id, pipeline_id, order_index, name, kind, command, status, feedback)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(step.id)
        .bind(step.pipeline_id)
        .bind(step.order_index)
        .bind(&step.name)
        .bind(kind_to_string(step.kind))
        .bind(&step.command)
        .bind(step_status_to_string(step.status))
        .bind(&step.feedback)
        .execute(&mut *tx)
        .await?;

        created.push(step);
    }

    tx.commit().await?;

    Ok((pipeline, created))
}

/// Find a pipeline by ID
pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Pipeline>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, env_handle, status, cursor, created_at, updated_at
        FROM pipelines
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List condensed pipeline rows for the dashboard aggregator
pub async fn list_summaries(pool: &SqlitePool) -> Result<Vec<PipelineSummary>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SummaryRow>(
        r#"
        SELECT p.id, p.env_handle, p.status, p.cursor, p.created_at, p.updated_at,
               (SELECT COUNT(*) FROM steps s WHERE s.pipeline_id = p.id) AS total_steps,
               (SELECT COUNT(*) FROM steps s WHERE s.pipeline_id = p.id AND s.status = 'Completed')
                   AS completed_steps
        FROM pipelines p
        ORDER BY p.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Update pipeline status
pub async fn set_status(
    pool: &SqlitePool,
    id: Uuid,
    status: PipelineStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE pipelines
        SET status = $1, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(status_to_string(status))
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update pipeline status only while the pipeline is still active.
///
/// Returns whether a row changed; a cancelled or finished pipeline is left
/// untouched.
pub async fn set_status_if_active(
    pool: &SqlitePool,
    id: Uuid,
    status: PipelineStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pipelines
        SET status = $1, updated_at = $2
        WHERE id = $3 AND status IN ('Running', 'AwaitingGate')
        "#,
    )
    .bind(status_to_string(status))
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move the cursor and set the matching pipeline status in one write
pub async fn set_cursor_and_status(
    pool: &SqlitePool,
    id: Uuid,
    cursor: i64,
    status: PipelineStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE pipelines
        SET cursor = $1, status = $2, updated_at = $3
        WHERE id = $4
        "#,
    )
    .bind(cursor)
    .bind(status_to_string(status))
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a pipeline and everything it owns in one transaction.
///
/// Steps, tasks and events go with it; no orphaned rows survive.
pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM task_events
        WHERE task_id IN (
            SELECT t.id FROM tasks t
            JOIN steps s ON t.step_id = s.id
            WHERE s.pipeline_id = $1
        )
        "#,
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM tasks WHERE step_id IN (SELECT id FROM steps WHERE pipeline_id = $1)")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM steps WHERE pipeline_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM pipelines WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

pub(crate) fn status_to_string(status: PipelineStatus) -> &'static str {
    match status {
        PipelineStatus::Running => "Running",
        PipelineStatus::AwaitingGate => "AwaitingGate",
        PipelineStatus::Completed => "Completed",
        PipelineStatus::Failed => "Failed",
        PipelineStatus::Cancelled => "Cancelled",
    }
}

fn string_to_status(s: &str) -> PipelineStatus {
    match s {
        "Running" => PipelineStatus::Running,
        "AwaitingGate" => PipelineStatus::AwaitingGate,
        "Completed" => PipelineStatus::Completed,
        "Failed" => PipelineStatus::Failed,
        "Cancelled" => PipelineStatus::Cancelled,
        _ => PipelineStatus::Failed,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    env_handle: String,
    status: String,
    cursor: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        Pipeline {
            id: row.id,
            env_handle: row.env_handle,
            status: string_to_status(&row.status),
            cursor: row.cursor,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    env_handle: String,
    status: String,
    cursor: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    total_steps: i64,
    completed_steps: i64,
}

impl From<SummaryRow> for PipelineSummary {
    fn from(row: SummaryRow) -> Self {
        PipelineSummary {
            id: row.id,
            env_handle: row.env_handle,
            status: string_to_status(&row.status),
            cursor: row.cursor,
            total_steps: row.total_steps,
            completed_steps: row.completed_steps,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
