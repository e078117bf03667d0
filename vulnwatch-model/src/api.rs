//! Wire types for the scan server's REST API.

use serde::{Deserialize, Serialize};

use crate::ids::JobId;
use crate::job::JobStatus;

/// Response envelope shared by every scan-server endpoint.
///
/// `status` is `1` on success; failures carry a human-readable `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Wire value of `status` on success.
    pub const SUCCESS: i64 = 1;

    /// Whether the server reported success.
    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }

    /// Successful envelope around a payload.
    pub fn success(data: T) -> Self {
        ApiEnvelope {
            status: Self::SUCCESS,
            data: Some(data),
            message: None,
        }
    }

    /// Failure envelope with a reason.
    pub fn failure(message: impl Into<String>) -> Self {
        ApiEnvelope {
            status: 0,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Body of `POST /api/scan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartScanRequest {
    pub domain: String,
}

/// Payload of a successful `POST /api/scan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartScanResponse {
    pub job_id: JobId,
}

/// Payload of `GET /api/scan/status/{job_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
}
