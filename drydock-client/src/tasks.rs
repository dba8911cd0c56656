//! Task-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use drydock_core::domain::task::Task;
use drydock_core::dto::event::EventsResponse;
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Task Reads & Event Polling
    // =============================================================================

    /// Get a task by ID
    ///
    /// # Arguments
    /// * `task_id` - The task UUID
    pub async fn get_task(&self, task_id: Uuid) -> Result<Task> {
        let url = format!("{}/tasks/{}", self.base_url, task_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Poll a task's events after a watermark
    ///
    /// Events come back in ascending seq order with no gaps; pass the
    /// highest seq already seen to receive only the delta.
    ///
    /// # Example
    /// ```no_run
    /// # use drydock_client::OrchestratorClient;
    /// # use uuid::Uuid;
    /// # async fn example(task_id: Uuid) -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let mut last_seen = 0;
    /// loop {
    ///     let batch = client.list_events(task_id, Some(last_seen)).await?;
    ///     for event in &batch {
    ///         println!("{} {:?}", event.seq, event.event_type);
    ///         last_seen = event.seq;
    ///     }
    ///     if batch.is_empty() {
    ///         break;
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list_events(
        &self,
        task_id: Uuid,
        after: Option<i64>,
    ) -> Result<Vec<drydock_core::domain::event::TaskEvent>> {
        let url = match after {
            Some(seq) => format!("{}/tasks/{}/events?after={}", self.base_url, task_id, seq),
            None => format!("{}/tasks/{}/events", self.base_url, task_id),
        };
        let response = self.client.get(&url).send().await?;

        let body: EventsResponse = self.handle_response(response).await?;
        Ok(body.events)
    }
}
