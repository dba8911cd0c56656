//! Per-pipeline critical sections
//!
//! Gate decisions, cursor advancement, cancellation and task-outcome
//! application on the same pipeline must serialize; pipelines never lock
//! each other. The registry itself is rebuildable from nothing — the
//! durable rows are the source of truth, a lock only fences concurrent
//! mutators inside this process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct PipelineLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PipelineLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `pipeline_id`, creating it on first use.
    pub fn for_pipeline(&self, pipeline_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.entry(pipeline_id).or_default().clone()
    }

    /// Drops the entry once the pipeline row is gone.
    pub fn forget(&self, pipeline_id: Uuid) {
        self.inner.lock().unwrap().remove(&pipeline_id);
    }
}
