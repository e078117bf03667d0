//! Runtime configuration.

use url::Url;

use crate::error::{DashError, Result};

/// Fallback scan server endpoint when the environment does not name one.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Dashboard runtime configuration.
///
/// The scan server's base endpoint is the only external configuration point.
#[derive(Debug, Clone)]
pub struct DashConfig {
    pub server_url: String,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

impl DashConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        DashConfig {
            server_url: server_url.into(),
        }
    }

    /// Read configuration from the environment, falling back to defaults.
    pub fn from_environment() -> Self {
        let server_url = std::env::var("VULNWATCH_SERVER_URL")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        Self::new(server_url)
    }

    /// Reject endpoints that are not absolute http(s) URLs before any
    /// request is attempted.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| DashError::InvalidConfig(format!("server url: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(DashError::InvalidConfig(format!(
                "unsupported server url scheme '{other}'"
            ))),
        }
    }
}
