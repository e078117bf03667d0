//! Pure presentation adapters.
//!
//! Stateless transforms from watcher snapshots to renderable values. No I/O,
//! no error handling beyond defaulting when inputs are absent.

use chrono::{DateTime, Local, Utc};
use vulnwatch_model::{CrawlRecord, JobStatus};

/// Progress display step for a running scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    Crawling,
    Parsing,
    Analyzing,
}

impl ScanStep {
    /// 1-based position in the three-step progress bar.
    pub fn index(self) -> u8 {
        match self {
            ScanStep::Crawling => 1,
            ScanStep::Parsing => 2,
            ScanStep::Analyzing => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScanStep::Crawling => "crawling",
            ScanStep::Parsing => "parsing",
            ScanStep::Analyzing => "analyzing",
        }
    }
}

/// Map numeric progress to the three-step display.
///
/// A terminal job is always shown at the last step: the server may report
/// completion before it emits a final progress value of 100.
pub fn scan_step(progress: u8, terminal: bool) -> ScanStep {
    if terminal {
        return ScanStep::Analyzing;
    }
    match progress {
        0..=33 => ScanStep::Crawling,
        34..=66 => ScanStep::Parsing,
        _ => ScanStep::Analyzing,
    }
}

/// Badge color bucket for a risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Safe,
    Warning,
    Danger,
}

/// Map a server risk classification to a badge. The vocabulary is owned by
/// the server; anything unrecognized is rendered at the most severe level.
pub fn risk_badge(risk: &str) -> Badge {
    match risk {
        "Safe" => Badge::Safe,
        "Warning" => Badge::Warning,
        _ => Badge::Danger,
    }
}

/// Badge for a job's lifecycle status in the history list.
pub fn status_badge(status: JobStatus) -> Badge {
    match status {
        JobStatus::Done | JobStatus::Finish => Badge::Safe,
        JobStatus::Error => Badge::Danger,
        JobStatus::Pending | JobStatus::Running | JobStatus::Unknown => Badge::Warning,
    }
}

/// Totals derived from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanStats {
    pub total: usize,
    pub vulnerable: usize,
    pub safe: usize,
}

/// Derive display totals. `safe` never goes negative, even when the server
/// reports more findings than crawled URLs.
pub fn scan_stats(total: usize, vulnerable: usize) -> ScanStats {
    ScanStats {
        total,
        vulnerable,
        safe: total.saturating_sub(vulnerable),
    }
}

/// Crawl rows sorted newest-first for display; rows without a timestamp sink
/// to the end in their original order.
pub fn sort_crawl_for_display(mut rows: Vec<CrawlRecord>) -> Vec<CrawlRecord> {
    rows.sort_by(|a, b| match (&b.created_at, &a.created_at) {
        (Some(tb), Some(ta)) => tb.cmp(ta),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    });
    rows
}

/// Format a timestamp for local display, with a placeholder when absent.
pub fn format_timestamp(ts: Option<&DateTime<Utc>>) -> String {
    match ts {
        Some(t) => t
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "-".to_string(),
    }
}
