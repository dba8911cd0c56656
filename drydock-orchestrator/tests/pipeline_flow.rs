//! End-to-end engine tests against an in-memory database and a scripted
//! session channel: cursor advancement, gate decisions, revision rewind,
//! event-log ordering, cancellation and recovery.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use drydock_core::domain::event::EventType;
use drydock_core::domain::pipeline::PipelineStatus;
use drydock_core::domain::step::{StepKind, StepStatus};
use drydock_core::domain::task::TaskStatus;
use drydock_core::dto::gate::{GateAction, GateDecision};
use drydock_core::dto::pipeline::{CreatePipeline, CreateStep, PipelineWithSteps};

use drydock_orchestrator::channel::{ChannelError, CommandOutput, SessionChannel};
use drydock_orchestrator::db;
use drydock_orchestrator::locks::PipelineLocks;
use drydock_orchestrator::repository::task_repository;
use drydock_orchestrator::service::executor::{ExecutorConfig, TaskExecutor, spawn_outcome_loop};
use drydock_orchestrator::service::gate::GateError;
use drydock_orchestrator::service::pipeline::PipelineError;
use drydock_orchestrator::service::{event_service, gate_service, pipeline_service, task_service};
use drydock_orchestrator::state::AppState;

// =============================================================================
// Scripted Channel
// =============================================================================

enum Behavior {
    /// Succeed, echoing the command back as output
    Echo,
    /// Fail every command with a non-zero exit
    FailCommand,
    /// Never return
    Hang,
    /// Drop the connection on the first command, then echo
    LoseConnectionOnce,
}

struct ScriptedChannel {
    behavior: Behavior,
    ensure_calls: AtomicUsize,
    tripped: AtomicBool,
}

impl ScriptedChannel {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            ensure_calls: AtomicUsize::new(0),
            tripped: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SessionChannel for ScriptedChannel {
    async fn ensure_session(&self, _env_handle: &str) -> Result<(), ChannelError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run_command(
        &self,
        env_handle: &str,
        command: &str,
    ) -> Result<CommandOutput, ChannelError> {
        match self.behavior {
            Behavior::Echo => Ok(CommandOutput {
                exit_code: 0,
                output: format!("ran: {}", command),
            }),
            Behavior::FailCommand => Err(ChannelError::CommandFailed {
                exit_code: 1,
                output: "remote command failed".to_string(),
            }),
            Behavior::Hang => std::future::pending().await,
            Behavior::LoseConnectionOnce => {
                if !self.tripped.swap(true, Ordering::SeqCst) {
                    Err(ChannelError::ConnectionLost {
                        env: env_handle.to_string(),
                        reason: "socket closed".to_string(),
                    })
                } else {
                    Ok(CommandOutput {
                        exit_code: 0,
                        output: format!("ran: {}", command),
                    })
                }
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn quick_config() -> ExecutorConfig {
    ExecutorConfig {
        command_timeout: Duration::from_secs(5),
        recovery_timeout: Duration::from_secs(60),
    }
}

async fn test_state(channel: Arc<dyn SessionChannel>, config: ExecutorConfig) -> AppState {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");

    db::run_migrations(&pool).await.expect("migrations failed");

    let (executor, outcomes) = TaskExecutor::new(pool.clone(), channel, config);

    let state = AppState {
        pool,
        executor,
        locks: PipelineLocks::new(),
    };

    spawn_outcome_loop(state.clone(), outcomes);

    state
}

fn auto(name: &str, command: &str) -> CreateStep {
    CreateStep {
        name: name.to_string(),
        kind: StepKind::Automated,
        command: Some(command.to_string()),
        order_index: None,
    }
}

fn gated(name: &str) -> CreateStep {
    CreateStep {
        name: name.to_string(),
        kind: StepKind::Gated,
        command: None,
        order_index: None,
    }
}

fn launch(steps: Vec<CreateStep>) -> CreatePipeline {
    CreatePipeline {
        env_handle: "dev-env-1".to_string(),
        steps,
    }
}

fn decide(action: GateAction) -> GateDecision {
    GateDecision {
        action,
        feedback: None,
        revise_to_step_id: None,
    }
}

fn assert_at_most_one_active(detail: &PipelineWithSteps) {
    let active = detail
        .steps
        .iter()
        .filter(|s| s.step.status.is_active())
        .count();
    assert!(
        active <= 1,
        "pipeline {} has {} active steps",
        detail.pipeline.id,
        active
    );
}

async fn wait_for<F>(state: &AppState, pipeline_id: Uuid, mut pred: F) -> PipelineWithSteps
where
    F: FnMut(&PipelineWithSteps) -> bool,
{
    for _ in 0..500 {
        let detail = pipeline_service::get_pipeline_with_steps(state, pipeline_id)
            .await
            .expect("failed to load pipeline");
        assert_at_most_one_active(&detail);
        if pred(&detail) {
            return detail;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never met for pipeline {}", pipeline_id);
}

async fn wait_for_status(
    state: &AppState,
    pipeline_id: Uuid,
    status: PipelineStatus,
) -> PipelineWithSteps {
    wait_for(state, pipeline_id, |d| d.pipeline.status == status).await
}

fn step<'a>(detail: &'a PipelineWithSteps, name: &str) -> &'a drydock_core::dto::pipeline::StepDetail {
    detail
        .steps
        .iter()
        .find(|s| s.step.name == name)
        .expect("step not found")
}

// =============================================================================
// Automated Execution
// =============================================================================

#[tokio::test]
async fn automated_pipeline_runs_to_completion() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let created = pipeline_service::create_pipeline(
        &state,
        launch(vec![auto("build", "make build"), auto("test", "make test")]),
    )
    .await
    .expect("create failed");

    let done = wait_for_status(&state, created.pipeline.id, PipelineStatus::Completed).await;

    for detail in &done.steps {
        assert_eq!(detail.step.status, StepStatus::Completed);
        let task = detail.task.as_ref().expect("automated step has a task");
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert!(task.started_at.is_some());
        assert!(task.finished_at.is_some());
    }
}

#[tokio::test]
async fn event_log_is_gapless_and_pollable() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let created = pipeline_service::create_pipeline(&state, launch(vec![auto("build", "make")]))
        .await
        .expect("create failed");

    let done = wait_for_status(&state, created.pipeline.id, PipelineStatus::Completed).await;
    let task = done.steps[0].task.as_ref().expect("task");

    let events = event_service::list_events(&state.pool, task.id, None)
        .await
        .expect("list failed");

    // running, output chunk, succeeded
    assert_eq!(events.len(), 3);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as i64 + 1, "seq must be gapless from 1");
    }
    assert_eq!(events[0].event_type, EventType::StatusChange);
    assert_eq!(events[1].event_type, EventType::OutputChunk);
    assert_eq!(events[1].payload["chunk"], "ran: make");

    // Delta polling from a watermark
    let tail = event_service::list_events(&state.pool, task.id, Some(1))
        .await
        .expect("list failed");
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].seq, 2);

    let empty = event_service::list_events(&state.pool, task.id, Some(events.len() as i64))
        .await
        .expect("list failed");
    assert!(empty.is_empty());
}

#[tokio::test]
async fn concurrent_appends_never_gap_the_sequence() {
    let state = test_state(ScriptedChannel::new(Behavior::Hang), quick_config()).await;

    let created = pipeline_service::create_pipeline(&state, launch(vec![auto("build", "make")]))
        .await
        .expect("create failed");

    let detail = wait_for(&state, created.pipeline.id, |d| {
        d.steps[0]
            .task
            .as_ref()
            .is_some_and(|t| t.status == TaskStatus::Running)
    })
    .await;
    let task_id = detail.steps[0].task.as_ref().unwrap().id;

    let mut handles = Vec::new();
    for i in 0..10 {
        let pool = state.pool.clone();
        handles.push(tokio::spawn(async move {
            event_service::append(
                &pool,
                task_id,
                EventType::OutputChunk,
                serde_json::json!({ "chunk": format!("line {}", i) }),
            )
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("append failed");
    }

    // One status-change from the driver plus the ten appends above.
    let events = event_service::list_events(&state.pool, task_id, None)
        .await
        .expect("list failed");
    assert_eq!(events.len(), 11);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as i64 + 1, "seq must be gapless from 1");
    }
}

#[tokio::test]
async fn failed_command_fails_pipeline_and_leaves_rest_pending() {
    let state = test_state(ScriptedChannel::new(Behavior::FailCommand), quick_config()).await;

    let created = pipeline_service::create_pipeline(
        &state,
        launch(vec![auto("build", "make"), auto("deploy", "make deploy")]),
    )
    .await
    .expect("create failed");

    let done = wait_for_status(&state, created.pipeline.id, PipelineStatus::Failed).await;

    let build = step(&done, "build");
    assert_eq!(build.step.status, StepStatus::Failed);
    let task = build.task.as_ref().expect("task");
    assert_eq!(task.status, TaskStatus::Failed);

    // Failure does not invalidate or execute the remaining steps.
    assert_eq!(step(&done, "deploy").step.status, StepStatus::Pending);
    assert!(step(&done, "deploy").task.is_none());

    let events = event_service::list_events(&state.pool, task.id, None)
        .await
        .expect("list failed");
    assert!(events.iter().any(|e| e.event_type == EventType::Error));
}

#[tokio::test]
async fn lost_connection_is_retried_once() {
    let channel = ScriptedChannel::new(Behavior::LoseConnectionOnce);
    let state = test_state(channel.clone(), quick_config()).await;

    let created = pipeline_service::create_pipeline(&state, launch(vec![auto("build", "make")]))
        .await
        .expect("create failed");

    let done = wait_for_status(&state, created.pipeline.id, PipelineStatus::Completed).await;

    let task = done.steps[0].task.as_ref().expect("task");
    assert_eq!(task.status, TaskStatus::Succeeded);
    // Initial ensure plus the re-establish before the retry.
    assert!(channel.ensure_calls.load(Ordering::SeqCst) >= 2);
}

// =============================================================================
// Gates
// =============================================================================

#[tokio::test]
async fn gated_step_parks_and_approval_advances() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let created = pipeline_service::create_pipeline(
        &state,
        launch(vec![
            auto("build", "make"),
            gated("review"),
            auto("deploy", "make deploy"),
        ]),
    )
    .await
    .expect("create failed");
    let pipeline_id = created.pipeline.id;

    let parked = wait_for_status(&state, pipeline_id, PipelineStatus::AwaitingGate).await;
    let review = step(&parked, "review");
    assert_eq!(review.step.status, StepStatus::AwaitingGate);
    assert!(review.task.is_none(), "gated steps never own a task");
    assert_eq!(parked.pipeline.cursor, review.step.order_index);

    gate_service::handle_gate_decision(
        &state,
        pipeline_id,
        review.step.id,
        decide(GateAction::Approve),
    )
    .await
    .expect("approve failed");

    let done = wait_for_status(&state, pipeline_id, PipelineStatus::Completed).await;
    assert_eq!(step(&done, "review").step.status, StepStatus::Completed);
    assert_eq!(step(&done, "deploy").step.status, StepStatus::Completed);
    assert!(step(&done, "deploy").task.is_some());
}

#[tokio::test]
async fn rejection_fails_pipeline_and_attaches_feedback() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let created = pipeline_service::create_pipeline(
        &state,
        launch(vec![
            auto("build", "make"),
            gated("review"),
            auto("deploy", "make deploy"),
        ]),
    )
    .await
    .expect("create failed");
    let pipeline_id = created.pipeline.id;

    let parked = wait_for_status(&state, pipeline_id, PipelineStatus::AwaitingGate).await;
    let review_id = step(&parked, "review").step.id;

    let after = gate_service::handle_gate_decision(
        &state,
        pipeline_id,
        review_id,
        GateDecision {
            action: GateAction::Reject,
            feedback: Some("not ready".to_string()),
            revise_to_step_id: None,
        },
    )
    .await
    .expect("reject failed");

    assert_eq!(after.pipeline.status, PipelineStatus::Failed);
    assert_eq!(step(&after, "review").step.status, StepStatus::Failed);
    assert_eq!(
        step(&after, "review").step.feedback.as_deref(),
        Some("not ready")
    );
    assert_eq!(step(&after, "deploy").step.status, StepStatus::Pending);
}

#[tokio::test]
async fn revision_rewinds_invalidates_and_reexecutes() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let created = pipeline_service::create_pipeline(
        &state,
        launch(vec![
            auto("build", "make"),
            gated("review"),
            auto("deploy", "make deploy"),
        ]),
    )
    .await
    .expect("create failed");
    let pipeline_id = created.pipeline.id;

    let parked = wait_for_status(&state, pipeline_id, PipelineStatus::AwaitingGate).await;
    let build_id = step(&parked, "build").step.id;
    let review_id = step(&parked, "review").step.id;

    assert_eq!(task_repository::count_by_step(&state.pool, build_id).await.unwrap(), 1);

    gate_service::handle_gate_decision(
        &state,
        pipeline_id,
        review_id,
        GateDecision {
            action: GateAction::Revise,
            feedback: Some("rebuild with fixes".to_string()),
            revise_to_step_id: Some(build_id),
        },
    )
    .await
    .expect("revise failed");

    let done = wait_for_status(&state, pipeline_id, PipelineStatus::Completed).await;

    // The target re-ran on its original row with a fresh task.
    assert_eq!(step(&done, "build").step.status, StepStatus::Completed);
    assert_eq!(
        step(&done, "build").step.feedback.as_deref(),
        Some("rebuild with fixes")
    );
    assert_eq!(task_repository::count_by_step(&state.pool, build_id).await.unwrap(), 2);

    // The rewound range is out of the active path; deploy still ran.
    assert_eq!(step(&done, "review").step.status, StepStatus::Invalidated);
    assert_eq!(step(&done, "deploy").step.status, StepStatus::Completed);
}

#[tokio::test]
async fn forward_revision_is_rejected() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let created = pipeline_service::create_pipeline(
        &state,
        launch(vec![gated("plan"), auto("build", "make")]),
    )
    .await
    .expect("create failed");
    let pipeline_id = created.pipeline.id;

    let parked = wait_for_status(&state, pipeline_id, PipelineStatus::AwaitingGate).await;
    let plan_id = step(&parked, "plan").step.id;
    let build_id = step(&parked, "build").step.id;

    let result = gate_service::handle_gate_decision(
        &state,
        pipeline_id,
        plan_id,
        GateDecision {
            action: GateAction::Revise,
            feedback: None,
            revise_to_step_id: Some(build_id),
        },
    )
    .await;

    assert!(matches!(result, Err(GateError::InvalidState(_))));

    // Nothing moved.
    let detail = pipeline_service::get_pipeline_with_steps(&state, pipeline_id)
        .await
        .unwrap();
    assert_eq!(detail.pipeline.status, PipelineStatus::AwaitingGate);
    assert_eq!(step(&detail, "plan").step.status, StepStatus::AwaitingGate);
}

#[tokio::test]
async fn gate_decision_on_non_gated_step_is_invalid_state() {
    let state = test_state(ScriptedChannel::new(Behavior::Hang), quick_config()).await;

    let created = pipeline_service::create_pipeline(
        &state,
        launch(vec![auto("build", "make"), gated("review")]),
    )
    .await
    .expect("create failed");
    let pipeline_id = created.pipeline.id;

    let detail = wait_for(&state, pipeline_id, |d| {
        d.steps[0].step.status == StepStatus::Running
    })
    .await;

    // The running automated step is not parked at a gate.
    let running_id = detail.steps[0].step.id;
    let result = gate_service::handle_gate_decision(
        &state,
        pipeline_id,
        running_id,
        decide(GateAction::Approve),
    )
    .await;
    assert!(matches!(result, Err(GateError::InvalidState(_))));

    // Neither is the pending gated step behind it.
    let pending_id = detail.steps[1].step.id;
    let result = gate_service::handle_gate_decision(
        &state,
        pipeline_id,
        pending_id,
        decide(GateAction::Approve),
    )
    .await;
    assert!(matches!(result, Err(GateError::InvalidState(_))));
}

#[tokio::test]
async fn concurrent_gate_decisions_have_a_single_winner() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let created = pipeline_service::create_pipeline(&state, launch(vec![gated("review")]))
        .await
        .expect("create failed");
    let pipeline_id = created.pipeline.id;

    let parked = wait_for_status(&state, pipeline_id, PipelineStatus::AwaitingGate).await;
    let review_id = step(&parked, "review").step.id;

    let approve_state = state.clone();
    let reject_state = state.clone();

    let approve = tokio::spawn(async move {
        gate_service::handle_gate_decision(
            &approve_state,
            pipeline_id,
            review_id,
            decide(GateAction::Approve),
        )
        .await
    });
    let reject = tokio::spawn(async move {
        gate_service::handle_gate_decision(
            &reject_state,
            pipeline_id,
            review_id,
            decide(GateAction::Reject),
        )
        .await
    });

    let approve_result = approve.await.unwrap();
    let reject_result = reject.await.unwrap();

    let wins =
        approve_result.is_ok() as usize + reject_result.is_ok() as usize;
    assert_eq!(wins, 1, "exactly one decision must win");

    let detail = pipeline_service::get_pipeline_with_steps(&state, pipeline_id)
        .await
        .unwrap();

    if approve_result.is_ok() {
        assert!(matches!(reject_result, Err(GateError::Conflict(_))));
        assert_eq!(step(&detail, "review").step.status, StepStatus::Completed);
        assert_eq!(detail.pipeline.status, PipelineStatus::Completed);
    } else {
        assert!(matches!(approve_result, Err(GateError::Conflict(_))));
        assert_eq!(step(&detail, "review").step.status, StepStatus::Failed);
        assert_eq!(detail.pipeline.status, PipelineStatus::Failed);
    }
}

// =============================================================================
// Deletion & Cancellation
// =============================================================================

#[tokio::test]
async fn deleting_an_active_pipeline_is_refused() {
    let state = test_state(ScriptedChannel::new(Behavior::Hang), quick_config()).await;

    let created = pipeline_service::create_pipeline(&state, launch(vec![auto("build", "make")]))
        .await
        .expect("create failed");
    let pipeline_id = created.pipeline.id;

    wait_for(&state, pipeline_id, |d| {
        d.steps[0].step.status == StepStatus::Running
    })
    .await;

    let result = pipeline_service::delete_pipeline(&state, pipeline_id).await;
    assert!(matches!(result, Err(PipelineError::InvalidState(_))));

    // Rows are untouched.
    let detail = pipeline_service::get_pipeline_with_steps(&state, pipeline_id)
        .await
        .expect("pipeline must survive the refused delete");
    assert_eq!(detail.steps.len(), 1);
    assert_eq!(detail.pipeline.status, PipelineStatus::Running);
}

#[tokio::test]
async fn deleting_a_finished_pipeline_removes_everything() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let created = pipeline_service::create_pipeline(&state, launch(vec![auto("build", "make")]))
        .await
        .expect("create failed");
    let pipeline_id = created.pipeline.id;

    let done = wait_for_status(&state, pipeline_id, PipelineStatus::Completed).await;
    let task_id = done.steps[0].task.as_ref().unwrap().id;

    pipeline_service::delete_pipeline(&state, pipeline_id)
        .await
        .expect("delete failed");

    let result = pipeline_service::get_pipeline_with_steps(&state, pipeline_id).await;
    assert!(matches!(result, Err(PipelineError::NotFound(_))));

    // No orphaned tasks or events.
    assert!(task_repository::find_by_id(&state.pool, task_id)
        .await
        .unwrap()
        .is_none());
    let events = event_service::list_events(&state.pool, task_id, None).await;
    assert!(matches!(
        events,
        Err(event_service::EventError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn cancelling_a_running_task_fails_step_and_pipeline() {
    let state = test_state(ScriptedChannel::new(Behavior::Hang), quick_config()).await;

    let created = pipeline_service::create_pipeline(&state, launch(vec![auto("build", "make")]))
        .await
        .expect("create failed");
    let pipeline_id = created.pipeline.id;

    let detail = wait_for(&state, pipeline_id, |d| {
        d.steps[0]
            .task
            .as_ref()
            .is_some_and(|t| t.status == TaskStatus::Running)
    })
    .await;
    let task_id = detail.steps[0].task.as_ref().unwrap().id;

    let cancelled = task_service::cancel_task(&state, task_id)
        .await
        .expect("cancel failed");
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(cancelled.finished_at.is_some());

    let after = pipeline_service::get_pipeline_with_steps(&state, pipeline_id)
        .await
        .unwrap();
    assert_eq!(after.pipeline.status, PipelineStatus::Failed);
    assert_eq!(after.steps[0].step.status, StepStatus::Failed);

    let events = event_service::list_events(&state.pool, task_id, None)
        .await
        .unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == EventType::StatusChange && e.payload["status"] == "cancelled"));
}

#[tokio::test]
async fn cancelling_an_active_pipeline_records_cancelled() {
    let state = test_state(ScriptedChannel::new(Behavior::Hang), quick_config()).await;

    let created = pipeline_service::create_pipeline(&state, launch(vec![auto("build", "make")]))
        .await
        .expect("create failed");
    let pipeline_id = created.pipeline.id;

    wait_for(&state, pipeline_id, |d| {
        d.steps[0].step.status == StepStatus::Running
    })
    .await;

    let cancelled = pipeline_service::cancel_pipeline(&state, pipeline_id)
        .await
        .expect("cancel failed");
    assert_eq!(cancelled.status, PipelineStatus::Cancelled);

    let detail = pipeline_service::get_pipeline_with_steps(&state, pipeline_id)
        .await
        .unwrap();
    // The task outcome must not flip a cancelled pipeline to failed.
    assert_eq!(detail.pipeline.status, PipelineStatus::Cancelled);
    assert_eq!(detail.steps[0].step.status, StepStatus::Failed);

    // A cancelled pipeline is deletable.
    pipeline_service::delete_pipeline(&state, pipeline_id)
        .await
        .expect("delete after cancel failed");
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
async fn stale_running_task_is_failed_on_read() {
    let config = ExecutorConfig {
        command_timeout: Duration::from_secs(5),
        recovery_timeout: Duration::ZERO,
    };
    let state = test_state(ScriptedChannel::new(Behavior::Hang), config).await;

    let created = pipeline_service::create_pipeline(&state, launch(vec![auto("build", "make")]))
        .await
        .expect("create failed");
    let pipeline_id = created.pipeline.id;

    let detail = wait_for(&state, pipeline_id, |d| {
        d.steps[0]
            .task
            .as_ref()
            .is_some_and(|t| t.status == TaskStatus::Running)
    })
    .await;
    let task_id = detail.steps[0].task.as_ref().unwrap().id;

    // Kill the driver without finalizing the row: the task is now a
    // Running orphan, as after a crash.
    state.executor.signal_cancel(task_id);
    wait_for(&state, pipeline_id, |_| !state.executor.is_registered(task_id)).await;

    let healed = task_service::get_task(&state, task_id)
        .await
        .expect("get failed");
    assert_eq!(healed.status, TaskStatus::Failed);
    assert!(healed.finished_at.is_some());

    let events = event_service::list_events(&state.pool, task_id, None)
        .await
        .unwrap();
    assert!(events.iter().any(|e| e.event_type == EventType::Error));

    let after = pipeline_service::get_pipeline_with_steps(&state, pipeline_id)
        .await
        .unwrap();
    assert_eq!(after.pipeline.status, PipelineStatus::Failed);
    assert_eq!(after.steps[0].step.status, StepStatus::Failed);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn create_rejects_empty_and_duplicate_step_lists() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let result = pipeline_service::create_pipeline(&state, launch(vec![])).await;
    assert!(matches!(result, Err(PipelineError::ValidationError(_))));

    let mut first = auto("build", "make");
    first.order_index = Some(1);
    let mut second = auto("test", "make test");
    second.order_index = Some(1);

    let result = pipeline_service::create_pipeline(&state, launch(vec![first, second])).await;
    assert!(matches!(result, Err(PipelineError::ValidationError(_))));
}

#[tokio::test]
async fn events_for_unknown_task_are_not_found() {
    let state = test_state(ScriptedChannel::new(Behavior::Echo), quick_config()).await;

    let result = event_service::list_events(&state.pool, Uuid::new_v4(), None).await;
    assert!(matches!(
        result,
        Err(event_service::EventError::TaskNotFound(_))
    ));
}
