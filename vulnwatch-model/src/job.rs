//! Scan jobs and their lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::JobId;

/// One server-tracked scan execution for a domain.
///
/// Immutable once created except for `status`/`progress`, which only the
/// watcher updates from server responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Server-side row id; absent on payloads that do not serialize it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Server-issued identifier.
    pub job_id: JobId,
    /// Target domain the scan was started for.
    pub domain: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Percent complete, 0..=100. History rows omit it.
    #[serde(default)]
    pub progress: u8,
    /// May be null for legacy rows.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_at: Option<DateTime<Utc>>,
}

/// Lifecycle status as reported by the scan server.
///
/// `done` and `finish` are distinct wire values with identical terminal
/// meaning: the server stores `finish` but its in-memory store reports
/// `done`, and clients must accept both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Finish,
    Error,
    /// Wire value this client does not recognize; treated as still in flight.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether the status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Finish | JobStatus::Error)
    }

    /// Ordering rank used to keep displayed status monotonic: a fetched
    /// status only replaces the current one when it does not move backwards.
    /// Terminal statuses all rank equal; first reporter wins.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Pending | JobStatus::Unknown => 0,
            JobStatus::Running => 1,
            JobStatus::Done | JobStatus::Finish | JobStatus::Error => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Finish => "finish",
            JobStatus::Error => "error",
            JobStatus::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}
