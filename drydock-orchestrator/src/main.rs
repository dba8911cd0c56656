use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drydock_orchestrator::channel::ProcessChannel;
use drydock_orchestrator::locks::PipelineLocks;
use drydock_orchestrator::service::executor::{ExecutorConfig, TaskExecutor, spawn_outcome_loop};
use drydock_orchestrator::state::AppState;
use drydock_orchestrator::{api, db};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drydock_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Drydock Orchestrator...");

    // Get database URL from environment
    let database_url = std::env::var("DRYDOCK_DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://drydock.db?mode=rwc".to_string());

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // Wire the executor to the session channel and drain its outcomes
    let channel = Arc::new(ProcessChannel::new());
    let (executor, outcomes) =
        TaskExecutor::new(pool.clone(), channel, ExecutorConfig::from_env());

    let state = AppState {
        pool,
        executor,
        locks: PipelineLocks::new(),
    };

    spawn_outcome_loop(state.clone(), outcomes);

    // Build router with all API endpoints
    let app = api::create_router(state);

    // Get bind address
    let addr = std::env::var("DRYDOCK_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
