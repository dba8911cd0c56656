//! Task Executor
//!
//! Drives one asynchronous unit of remote work end to end: creates the
//! task, runs the step's command over the session channel, streams output
//! into the event log, and reports the outcome on a message channel that
//! the orchestrator applies to the step and pipeline. The caller of
//! `start` never blocks on the remote side; all progress is observable
//! only through the event log.

use drydock_core::domain::event::EventType;
use drydock_core::domain::pipeline::{Pipeline, PipelineStatus};
use drydock_core::domain::step::{Step, StepStatus};
use drydock_core::domain::task::{Task, TaskStatus};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::channel::{ChannelError, CommandOutput, SessionChannel};
use crate::repository::{pipeline_repository, step_repository, task_repository};
use crate::service::event_service;
use crate::service::pipeline_service;
use crate::service::task::TaskError;
use crate::state::AppState;

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on a single remote command; the task fails locally when
    /// it elapses, whatever the remote side is still doing.
    pub command_timeout: Duration,
    /// Age past which a running task with no registered driver is failed
    /// on read.
    pub recovery_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(300),
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl ExecutorConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - DRYDOCK_COMMAND_TIMEOUT_SECS (optional, default: 300)
    /// - DRYDOCK_RECOVERY_TIMEOUT_SECS (optional, default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let command_timeout = std::env::var("DRYDOCK_COMMAND_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.command_timeout);

        let recovery_timeout = std::env::var("DRYDOCK_RECOVERY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.recovery_timeout);

        Self {
            command_timeout,
            recovery_timeout,
        }
    }
}

/// Message sent when a driver finishes a task on its own.
///
/// Cancellation is finalized by the canceller, so only success and failure
/// flow through here.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub pipeline_id: Uuid,
    pub step_id: Uuid,
    pub task_id: Uuid,
    pub status: TaskStatus,
}

/// Drives tasks against the session channel.
///
/// Holds the registry of in-flight drivers (task id → cancel handle). The
/// registry is process-local and rebuildable: after a restart it is empty
/// and orphaned rows are healed by read-time recovery.
#[derive(Clone)]
pub struct TaskExecutor {
    pool: SqlitePool,
    channel: Arc<dyn SessionChannel>,
    registry: Arc<Mutex<HashMap<Uuid, oneshot::Sender<()>>>>,
    outcome_tx: mpsc::UnboundedSender<TaskOutcome>,
    config: ExecutorConfig,
}

impl TaskExecutor {
    /// Creates the executor and the outcome receiver the orchestrator must
    /// drain (see [`spawn_outcome_loop`]).
    pub fn new(
        pool: SqlitePool,
        channel: Arc<dyn SessionChannel>,
        config: ExecutorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TaskOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let executor = Self {
            pool,
            channel,
            registry: Arc::new(Mutex::new(HashMap::new())),
            outcome_tx,
            config,
        };

        (executor, outcome_rx)
    }

    pub fn recovery_timeout(&self) -> Duration {
        self.config.recovery_timeout
    }

    /// Whether a driver in this process currently owns the task.
    pub fn is_registered(&self, task_id: Uuid) -> bool {
        self.registry.lock().unwrap().contains_key(&task_id)
    }

    /// Signals the in-flight driver to stop. Best-effort: returns whether
    /// a driver was listening; the remote command may still be running
    /// after this returns. The caller finalizes task state.
    pub fn signal_cancel(&self, task_id: Uuid) -> bool {
        match self.registry.lock().unwrap().remove(&task_id) {
            Some(cancel_tx) => cancel_tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Create a queued task for the step and spawn its driver.
    ///
    /// Returns the task identity immediately. CONFLICT when the step
    /// already owns a non-terminal task — the guard against
    /// double-dispatch from duplicate advance calls.
    pub async fn start(&self, pipeline: &Pipeline, step: &Step) -> Result<Task, TaskError> {
        if let Some(existing) = task_repository::find_active_by_step(&self.pool, step.id).await? {
            return Err(TaskError::Conflict(format!(
                "Step {} already owns non-terminal task {}",
                step.id, existing.id
            )));
        }

        let command = step.command.clone().ok_or_else(|| {
            TaskError::InvalidState(format!("Step {} has no command to execute", step.id))
        })?;

        let task = task_repository::create(&self.pool, step.id).await?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.registry.lock().unwrap().insert(task.id, cancel_tx);

        tracing::info!("Task {} queued for step {}", task.id, step.id);

        tokio::spawn(drive_task(
            self.clone(),
            task.id,
            pipeline.id,
            step.id,
            pipeline.env_handle.clone(),
            command,
            cancel_rx,
        ));

        Ok(task)
    }
}

/// Runs one task to a terminal state.
///
/// Every channel failure ends here as task state plus an event — nothing
/// propagates back through the gate/advance path.
async fn drive_task(
    executor: TaskExecutor,
    task_id: Uuid,
    pipeline_id: Uuid,
    step_id: Uuid,
    env_handle: String,
    command: String,
    cancel_rx: oneshot::Receiver<()>,
) {
    let pool = executor.pool.clone();

    if let Err(e) = task_repository::mark_running(&pool, task_id).await {
        tracing::error!("Task {}: failed to mark running: {:?}", task_id, e);
        executor.registry.lock().unwrap().remove(&task_id);
        return;
    }

    append_or_log(
        &pool,
        task_id,
        EventType::StatusChange,
        serde_json::json!({ "status": "running" }),
    )
    .await;

    let result = tokio::select! {
        _ = cancel_rx => None,
        result = tokio::time::timeout(
            executor.config.command_timeout,
            run_remote(executor.channel.as_ref(), &env_handle, &command),
        ) => Some(result),
    };

    executor.registry.lock().unwrap().remove(&task_id);

    let Some(result) = result else {
        // Cancelled; the canceller finalizes task, step and pipeline.
        tracing::debug!("Task {} driver stopped by cancellation", task_id);
        return;
    };

    let status = match result {
        Ok(Ok(output)) => {
            if !output.output.is_empty() {
                append_or_log(
                    &pool,
                    task_id,
                    EventType::OutputChunk,
                    serde_json::json!({ "chunk": output.output }),
                )
                .await;
            }

            if !finish(&pool, task_id, TaskStatus::Succeeded).await {
                return;
            }

            append_or_log(
                &pool,
                task_id,
                EventType::StatusChange,
                serde_json::json!({ "status": "succeeded", "exit_code": output.exit_code }),
            )
            .await;

            tracing::info!("Task {} succeeded", task_id);
            TaskStatus::Succeeded
        }
        Ok(Err(err)) => {
            let payload = match &err {
                ChannelError::CommandFailed { exit_code, output } => serde_json::json!({
                    "message": err.to_string(),
                    "exit_code": exit_code,
                    "output": output,
                }),
                other => serde_json::json!({ "message": other.to_string() }),
            };
            append_or_log(&pool, task_id, EventType::Error, payload).await;

            if !finish(&pool, task_id, TaskStatus::Failed).await {
                return;
            }

            append_or_log(
                &pool,
                task_id,
                EventType::StatusChange,
                serde_json::json!({ "status": "failed" }),
            )
            .await;

            tracing::warn!("Task {} failed: {}", task_id, err);
            TaskStatus::Failed
        }
        Err(_) => {
            append_or_log(
                &pool,
                task_id,
                EventType::Error,
                serde_json::json!({
                    "message": format!(
                        "command timed out after {}s",
                        executor.config.command_timeout.as_secs()
                    ),
                }),
            )
            .await;

            if !finish(&pool, task_id, TaskStatus::Failed).await {
                return;
            }

            append_or_log(
                &pool,
                task_id,
                EventType::StatusChange,
                serde_json::json!({ "status": "failed" }),
            )
            .await;

            tracing::warn!("Task {} timed out", task_id);
            TaskStatus::Failed
        }
    };

    let outcome = TaskOutcome {
        pipeline_id,
        step_id,
        task_id,
        status,
    };

    if executor.outcome_tx.send(outcome).is_err() {
        tracing::warn!("Outcome channel closed; task {} outcome dropped", task_id);
    }
}

/// Ensure the session and run the command, retrying once after a lost
/// connection. Pooled connections can be silently invalidated; one retry,
/// then the error surfaces.
async fn run_remote(
    channel: &dyn SessionChannel,
    env_handle: &str,
    command: &str,
) -> Result<CommandOutput, ChannelError> {
    if let Err(first) = channel.ensure_session(env_handle).await {
        tracing::warn!(
            "ensure_session for {} failed ({}); retrying once",
            env_handle,
            first
        );
        channel.ensure_session(env_handle).await?;
    }

    match channel.run_command(env_handle, command).await {
        Err(ChannelError::ConnectionLost { .. }) => {
            tracing::warn!(
                "Connection to {} lost mid-command; re-establishing and retrying once",
                env_handle
            );
            channel.ensure_session(env_handle).await?;
            channel.run_command(env_handle, command).await
        }
        other => other,
    }
}

async fn finish(pool: &SqlitePool, task_id: Uuid, status: TaskStatus) -> bool {
    match task_repository::mark_finished(pool, task_id, status).await {
        Ok(true) => true,
        Ok(false) => {
            // A canceller or recovery already finalized the task.
            tracing::debug!("Task {} was finalized elsewhere; driver backing off", task_id);
            false
        }
        Err(e) => {
            tracing::error!("Task {}: failed to finalize: {:?}", task_id, e);
            false
        }
    }
}

async fn append_or_log(
    pool: &SqlitePool,
    task_id: Uuid,
    event_type: EventType,
    payload: serde_json::Value,
) {
    if let Err(e) = event_service::append(pool, task_id, event_type, payload).await {
        tracing::error!("Task {}: failed to append event: {:?}", task_id, e);
    }
}

/// Apply driver outcomes to steps and pipelines.
///
/// One loop per process; outcomes for the same pipeline serialize on its
/// lock, so a concurrent gate decision and a task completion can never
/// both move the cursor.
pub fn spawn_outcome_loop(
    state: AppState,
    mut outcome_rx: mpsc::UnboundedReceiver<TaskOutcome>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outcome) = outcome_rx.recv().await {
            if let Err(e) = apply_outcome(&state, &outcome).await {
                tracing::error!(
                    "Failed to apply outcome for task {}: {:?}",
                    outcome.task_id,
                    e
                );
            }
        }
    })
}

async fn apply_outcome(state: &AppState, outcome: &TaskOutcome) -> Result<(), TaskError> {
    let lock = state.locks.for_pipeline(outcome.pipeline_id);
    let _guard = lock.lock().await;

    let step_status = match outcome.status {
        TaskStatus::Succeeded => StepStatus::Completed,
        _ => StepStatus::Failed,
    };

    let moved = step_repository::transition(
        &state.pool,
        outcome.step_id,
        StepStatus::Running,
        step_status,
    )
    .await?;

    if !moved {
        // The step left Running while the task was in flight (cancelled or
        // rewound); its outcome no longer drives the pipeline.
        tracing::debug!(
            "Ignoring outcome for task {}: step {} is no longer running",
            outcome.task_id,
            outcome.step_id
        );
        return Ok(());
    }

    if outcome.status == TaskStatus::Succeeded {
        pipeline_service::advance_locked(state, outcome.pipeline_id)
            .await
            .map_err(TaskError::from)?;
    } else {
        let failed = pipeline_repository::set_status_if_active(
            &state.pool,
            outcome.pipeline_id,
            PipelineStatus::Failed,
        )
        .await?;
        if failed {
            tracing::info!(
                "Pipeline {} failed at step {}",
                outcome.pipeline_id,
                outcome.step_id
            );
        }
    }

    Ok(())
}
