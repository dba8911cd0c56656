//! Drydock HTTP Client
//!
//! A simple, type-safe HTTP client for the Drydock orchestrator API,
//! used by read-only consumers such as the dashboard aggregator.
//!
//! # Example
//!
//! ```no_run
//! use drydock_client::OrchestratorClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     for summary in client.list_pipelines().await? {
//!         println!("{} [{:?}] {}/{} steps done",
//!             summary.id, summary.status, summary.completed_steps, summary.total_steps);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod pipelines;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Drydock orchestrator API
///
/// Provides methods for the read-side endpoints: pipeline summaries,
/// pipeline detail, task state and event polling.
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the orchestrator API
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Decode a response, mapping error statuses onto [`ClientError`]
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ClientError::ParseError(e.to_string()));
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        tracing::debug!("API error {}: {}", status, message);

        match status.as_u16() {
            404 => Err(ClientError::NotFound(message)),
            code => Err(ClientError::api_error(code, message)),
        }
    }
}
