//! Core data model definitions shared across vulnwatch crates.

pub mod api;
pub mod crawl;
pub mod ids;
pub mod job;
pub mod notify;
pub mod vuln;

// Intentionally curated re-exports for downstream consumers.
pub use api::{ApiEnvelope, StartScanRequest, StartScanResponse, StatusPayload};
pub use crawl::CrawlRecord;
pub use ids::JobId;
pub use job::{Job, JobStatus};
pub use notify::NotificationEvent;
pub use vuln::VulnerabilityRecord;
