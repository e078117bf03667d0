//! Dashboard engine for a remote vulnerability-scan server.
//!
//! The server does the actual work (crawling, sitemap parsing, SQL-injection
//! analysis); this crate tracks one scan job at a time and keeps an accurate
//! picture of it by merging two independent update channels:
//!
//! - a fixed-period polling loop over the status/crawl/vulnerability
//!   endpoints, which is the correctness backstop, and
//! - a server-push notification stream, which closes the latency gap when a
//!   job finishes between polls.
//!
//! All updates funnel through a single reconciliation fold
//! ([`watcher::WatchSession::apply`]) that enforces monotonic status and
//! progress, discards stale results from torn-down sessions, and freezes
//! state once a job is terminal. Presentation code only ever sees immutable
//! [`watcher::WatchSnapshot`] values.

pub mod api_client;
pub mod config;
pub mod error;
pub mod notifications;
pub mod view_models;
pub mod watcher;

pub use api_client::{ApiClient, ScanApi};
pub use config::DashConfig;
pub use error::{DashError, Result};
pub use notifications::NotificationChannel;
pub use watcher::{
    JobWatcher, WatchCommand, WatchEvent, WatchPhase, WatchSession, WatchSnapshot, WatcherHandle,
};
