//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use drydock_core::dto::pipeline::{PipelineSummary, PipelineWithSteps};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Reads
    // =============================================================================

    /// List condensed pipeline rows
    ///
    /// # Returns
    /// One summary per pipeline, newest first
    pub async fn list_pipelines(&self) -> Result<Vec<PipelineSummary>> {
        let url = format!("{}/pipelines", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a pipeline with its steps in execution order
    ///
    /// # Arguments
    /// * `pipeline_id` - The pipeline UUID
    ///
    /// # Example
    /// ```no_run
    /// # use drydock_client::OrchestratorClient;
    /// # use uuid::Uuid;
    /// # async fn example(id: Uuid) -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let detail = client.get_pipeline(id).await?;
    /// println!("pipeline {:?}, cursor at {}", detail.pipeline.status, detail.pipeline.cursor);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineWithSteps> {
        let url = format!("{}/pipelines/{}", self.base_url, pipeline_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
