//! Event DTOs

use serde::{Deserialize, Serialize};

use crate::domain::event::TaskEvent;

/// Response body for the event poll endpoint: events in ascending `seq`
/// order, after the caller's watermark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<TaskEvent>,
}
