//! Error types for the dashboard engine.

use thiserror::Error;

/// Errors produced by the dashboard engine.
///
/// Stale poll/push results are deliberately not represented here: a response
/// arriving after its session was torn down is discarded by the watcher's
/// epoch guard, silently and successfully.
#[derive(Debug, Error)]
pub enum DashError {
    /// Transport failure, non-success envelope, or undecodable payload on an
    /// API call. The reason is taken from the server's `message` field when
    /// one is present.
    #[error("request failed: {reason}")]
    RequestFailed { reason: String },

    /// The push stream is down and reconnect attempts are exhausted. Logged,
    /// never surfaced to presentation code; polling remains the backstop.
    #[error("notification channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Invalid runtime configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DashError {
    /// Shorthand for [`DashError::RequestFailed`].
    pub fn request(reason: impl Into<String>) -> Self {
        DashError::RequestFailed {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DashError>;
