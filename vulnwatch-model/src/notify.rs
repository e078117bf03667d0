//! Push notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::JobId;

/// Ephemeral push message announcing that a job has progressed or finished.
///
/// The wire payload carries only `{job_id, message}`; `received_at` is
/// stamped on the client when the frame is decoded. Not persisted anywhere;
/// the watcher keeps a bounded in-memory log of the most recent events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub job_id: JobId,
    pub message: String,
    /// Local receipt time, not a server field.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Build an event stamped with the current time.
    pub fn now(job_id: impl Into<JobId>, message: impl Into<String>) -> Self {
        NotificationEvent {
            job_id: job_id.into(),
            message: message.into(),
            received_at: Utc::now(),
        }
    }
}
