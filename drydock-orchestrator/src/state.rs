//! Shared application state

use sqlx::SqlitePool;

use crate::locks::PipelineLocks;
use crate::service::executor::TaskExecutor;

/// State handed to every API handler and threaded through the services.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub executor: TaskExecutor,
    pub locks: PipelineLocks,
}
