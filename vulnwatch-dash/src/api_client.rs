//! HTTP client for the remote scan API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use vulnwatch_model::{
    ApiEnvelope, CrawlRecord, Job, JobId, StartScanRequest, StartScanResponse, StatusPayload,
    VulnerabilityRecord,
};

use crate::error::{DashError, Result};

/// Client-wide request timeout. The upstream contract does not specify one;
/// this bounds a stuck start request or poll fetch.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Typed surface of the remote scan API as consumed by the watcher.
///
/// The watcher only ever talks to this trait, so tests substitute a scripted
/// implementation without a server. Every operation is an idempotent read
/// except [`ScanApi::start_scan`], which allocates a job server-side and is
/// therefore never retried automatically.
#[async_trait]
pub trait ScanApi: Send + Sync {
    /// Allocate a new scan job for a domain.
    async fn start_scan(&self, domain: &str) -> Result<StartScanResponse>;

    /// Current status and progress of a job.
    async fn scan_status(&self, job_id: &JobId) -> Result<StatusPayload>;

    /// All URLs crawled so far for a job.
    async fn crawl_results(&self, job_id: &JobId) -> Result<Vec<CrawlRecord>>;

    /// All vulnerability findings so far for a job.
    async fn vulnerability_results(&self, job_id: &JobId) -> Result<Vec<VulnerabilityRecord>>;

    /// Every job the server knows about, for the history view.
    async fn list_jobs(&self) -> Result<Vec<Job>>;
}

/// reqwest-backed client speaking the scan server's envelope format.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for a base endpoint, e.g. `http://localhost:5000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DashError::request(format!("failed to build http client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        log::info!("scan api client created for {base_url}");

        Ok(ApiClient { client, base_url })
    }

    /// Join a path onto the base endpoint.
    fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_enveloped<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.build_url(path);
        log::debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DashError::request(e.to_string()))?;
        Self::decode(response).await
    }

    /// Decode a response envelope, mapping any non-success shape to
    /// [`DashError::RequestFailed`] with the server's message when present.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let http_status = response.status();
        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| DashError::request(format!("undecodable response: {e}")))?;
        unwrap_envelope(http_status.is_success(), http_status.as_u16(), envelope)
    }
}

/// Envelope-to-result mapping, split out so the policy is testable without a
/// live `reqwest::Response`.
fn unwrap_envelope<T>(
    http_ok: bool,
    http_status: u16,
    envelope: ApiEnvelope<T>,
) -> Result<T> {
    if !http_ok || !envelope.is_success() {
        let reason = envelope
            .message
            .unwrap_or_else(|| format!("server returned status {http_status}"));
        return Err(DashError::RequestFailed { reason });
    }
    envelope
        .data
        .ok_or_else(|| DashError::request("empty response from server"))
}

#[async_trait]
impl ScanApi for ApiClient {
    async fn start_scan(&self, domain: &str) -> Result<StartScanResponse> {
        if domain.trim().is_empty() {
            return Err(DashError::request("domain must not be empty"));
        }
        // URL well-formedness is the server's concern; the only client-side
        // check is non-emptiness.
        let url = self.build_url("api/scan");
        log::debug!("POST {url} domain={domain}");
        let body = StartScanRequest {
            domain: domain.to_string(),
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DashError::request(e.to_string()))?;
        Self::decode(response).await
    }

    async fn scan_status(&self, job_id: &JobId) -> Result<StatusPayload> {
        self.get_enveloped(&format!("api/scan/status/{job_id}")).await
    }

    async fn crawl_results(&self, job_id: &JobId) -> Result<Vec<CrawlRecord>> {
        self.get_enveloped(&format!("api/scan/all/crawl/{job_id}")).await
    }

    async fn vulnerability_results(&self, job_id: &JobId) -> Result<Vec<VulnerabilityRecord>> {
        self.get_enveloped(&format!("api/scan/all/vuln/{job_id}")).await
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.get_enveloped("api/scan/all").await
    }
}
