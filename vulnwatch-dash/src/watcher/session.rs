//! The watch session state machine.
//!
//! One [`WatchSession`] tracks one scan job. Every input (start completions,
//! poll fetch results, push notifications, user commands) is expressed as a
//! [`WatchEvent`] and folded in through [`WatchSession::apply`], which returns
//! the side [`Effect`]s the driver must perform. The fold is pure with
//! respect to time and I/O, so every reconciliation rule is unit-testable
//! without timers or sockets.

use std::collections::VecDeque;

use vulnwatch_model::{CrawlRecord, Job, JobId, JobStatus, NotificationEvent, VulnerabilityRecord};

use crate::view_models::{self, ScanStats, ScanStep};

/// Most-recent push notifications retained by a session's log.
pub const NOTIFICATION_LOG_CAPACITY: usize = 50;

/// Lifecycle phase of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    /// No job is being watched.
    Idle,
    /// A start request is in flight; no job id yet.
    Starting,
    /// Polling and push delivery are active.
    Watching,
    /// The job reached done/finish/error; displayed state is frozen.
    Terminal,
}

/// Discrete input folded into a session.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// The user asked to scan a domain.
    StartRequested { domain: String },
    /// The start request resolved, successfully or not.
    StartCompleted {
        epoch: u64,
        result: std::result::Result<JobId, String>,
    },
    /// The user opened a job from the history view.
    JobOpened { job: Job },
    /// A status poll resolved.
    StatusFetched {
        epoch: u64,
        status: JobStatus,
        progress: u8,
    },
    /// A crawl-list fetch resolved.
    CrawlFetched {
        epoch: u64,
        records: Vec<CrawlRecord>,
    },
    /// A vulnerability-list fetch resolved.
    VulnsFetched {
        epoch: u64,
        records: Vec<VulnerabilityRecord>,
    },
    /// A push notification arrived (any job; filtering happens here).
    PushReceived { event: NotificationEvent },
    /// The user stopped watching.
    Closed,
}

/// Follow-up actions the driver must perform after a fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Begin (or restart) the polling loop for the watched job.
    StartPolling,
    /// Stop the polling loop.
    StopPolling,
    /// Fetch crawl and vulnerability lists once, out-of-band from the poll.
    RefreshLists,
    /// Issue the start request for the pending domain.
    IssueStart,
}

/// Client-side record of the job currently being observed.
///
/// Exactly one session's worth of state lives in each watcher; starting a new
/// scan or opening another history entry tears the previous session down
/// (epoch bump) before the successor initializes. The epoch is what renders
/// in-flight responses from a torn-down session inert: results carry the
/// epoch current when their request was issued, and [`apply`] drops any whose
/// epoch no longer matches.
///
/// [`apply`]: WatchSession::apply
#[derive(Debug, Clone)]
pub struct WatchSession {
    epoch: u64,
    phase: WatchPhase,
    job_id: Option<JobId>,
    domain: Option<String>,
    status: JobStatus,
    progress: u8,
    crawl: Vec<CrawlRecord>,
    vulns: Vec<VulnerabilityRecord>,
    notifications: VecDeque<NotificationEvent>,
    last_error: Option<String>,
}

impl Default for WatchSession {
    fn default() -> Self {
        WatchSession {
            epoch: 0,
            phase: WatchPhase::Idle,
            job_id: None,
            domain: None,
            status: JobStatus::Pending,
            progress: 0,
            crawl: Vec::new(),
            vulns: Vec::new(),
            notifications: VecDeque::new(),
            last_error: None,
        }
    }
}

impl WatchSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session generation. Captured when a request is issued and
    /// checked again when its result is applied.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// The bounded push-notification log (most recent last).
    pub fn notifications(&self) -> impl Iterator<Item = &NotificationEvent> {
        self.notifications.iter()
    }

    /// Immutable view of the current state for presentation code.
    pub fn snapshot(&self) -> WatchSnapshot {
        let terminal = self.phase == WatchPhase::Terminal;
        WatchSnapshot {
            phase: self.phase,
            job_id: self.job_id.clone(),
            domain: self.domain.clone(),
            status: self.status,
            progress: self.progress,
            step: view_models::scan_step(self.progress, terminal),
            stats: view_models::scan_stats(self.crawl.len(), self.vulns.len()),
            crawl: self.crawl.clone(),
            vulns: self.vulns.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Fold one event into the session and report the effects the driver
    /// must carry out.
    pub fn apply(&mut self, event: WatchEvent) -> Vec<Effect> {
        match event {
            WatchEvent::StartRequested { domain } => {
                self.teardown();
                self.phase = WatchPhase::Starting;
                self.domain = Some(domain);
                self.status = JobStatus::Pending;
                log::info!("starting scan for {}", self.domain.as_deref().unwrap_or(""));
                vec![Effect::StopPolling, Effect::IssueStart]
            }

            WatchEvent::StartCompleted { epoch, result } => {
                if self.stale(epoch) {
                    return Vec::new();
                }
                match result {
                    Ok(job_id) => {
                        log::info!("scan started, watching job {job_id}");
                        self.job_id = Some(job_id);
                        self.phase = WatchPhase::Watching;
                        self.status = JobStatus::Running;
                        vec![Effect::StartPolling]
                    }
                    Err(reason) => {
                        // Surfaced: the one failure the user must see and
                        // retry by hand. Never retried automatically, to
                        // avoid allocating duplicate jobs server-side.
                        log::error!("scan start failed: {reason}");
                        self.phase = WatchPhase::Idle;
                        self.status = JobStatus::Error;
                        self.last_error = Some(reason);
                        Vec::new()
                    }
                }
            }

            WatchEvent::JobOpened { job } => {
                self.teardown();
                log::info!("watching job {} ({})", job.job_id, job.domain);
                self.job_id = Some(job.job_id);
                self.domain = Some(job.domain);
                self.progress = job.progress.min(100);
                if job.status.is_terminal() {
                    self.phase = WatchPhase::Terminal;
                    self.status = job.status;
                    // Finished entries still get their result lists, once.
                    vec![Effect::StopPolling, Effect::RefreshLists]
                } else {
                    self.phase = WatchPhase::Watching;
                    self.status = if job.status == JobStatus::Unknown {
                        JobStatus::Pending
                    } else {
                        job.status
                    };
                    vec![Effect::StartPolling]
                }
            }

            WatchEvent::StatusFetched {
                epoch,
                status,
                progress,
            } => {
                if self.stale(epoch) || self.phase != WatchPhase::Watching {
                    return Vec::new();
                }
                self.progress = self.progress.max(progress.min(100));
                if status.is_terminal() {
                    log::info!("job {} reached terminal status {status} via poll",
                        self.job_id.as_ref().map(JobId::as_str).unwrap_or(""));
                    self.status = status;
                    self.phase = WatchPhase::Terminal;
                    return vec![Effect::StopPolling];
                }
                // Displayed status never moves backwards within a session.
                if status.rank() >= self.status.rank() && status != JobStatus::Unknown {
                    self.status = status;
                }
                Vec::new()
            }

            WatchEvent::CrawlFetched { epoch, records } => {
                if self.stale(epoch) {
                    return Vec::new();
                }
                self.crawl = records;
                Vec::new()
            }

            WatchEvent::VulnsFetched { epoch, records } => {
                if self.stale(epoch) {
                    return Vec::new();
                }
                self.vulns = records;
                Vec::new()
            }

            WatchEvent::PushReceived { event } => {
                let Some(watched) = self.job_id.clone() else {
                    log::debug!("push for job {} ignored: nothing watched", event.job_id);
                    return Vec::new();
                };
                if event.job_id != watched {
                    log::debug!(
                        "push for job {} ignored: watching {watched}",
                        event.job_id
                    );
                    return Vec::new();
                }
                self.push_log(event);
                if self.phase == WatchPhase::Terminal {
                    // Duplicate completion notice; logged, nothing else.
                    return Vec::new();
                }
                // The server only pushes when a job has finished; treat the
                // event as a completion signal and close the latency gap with
                // one immediate out-of-band list refresh.
                log::info!("job {watched} reached terminal status via push");
                self.status = JobStatus::Done;
                self.phase = WatchPhase::Terminal;
                vec![Effect::StopPolling, Effect::RefreshLists]
            }

            WatchEvent::Closed => {
                log::info!("watch session closed");
                self.teardown();
                vec![Effect::StopPolling]
            }
        }
    }

    /// Apply-time staleness check: results from a previous epoch belong to a
    /// torn-down session and are dropped without trace beyond a log line.
    fn stale(&self, epoch: u64) -> bool {
        if epoch != self.epoch {
            log::trace!("dropping stale result from epoch {epoch} (now {})", self.epoch);
            true
        } else {
            false
        }
    }

    /// Reset to idle and bump the epoch so in-flight work goes stale.
    ///
    /// The notification log survives: it belongs to the watcher, not to any
    /// single job.
    fn teardown(&mut self) {
        self.epoch += 1;
        self.phase = WatchPhase::Idle;
        self.job_id = None;
        self.domain = None;
        self.status = JobStatus::Pending;
        self.progress = 0;
        self.crawl.clear();
        self.vulns.clear();
        self.last_error = None;
    }

    fn push_log(&mut self, event: NotificationEvent) {
        if self.notifications.len() == NOTIFICATION_LOG_CAPACITY {
            self.notifications.pop_front();
        }
        self.notifications.push_back(event);
    }
}

/// Immutable copy of session state handed to presentation code.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSnapshot {
    pub phase: WatchPhase,
    pub job_id: Option<JobId>,
    pub domain: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    /// Derived three-step progress display position.
    pub step: ScanStep,
    /// Derived totals; `safe` is clamped at zero.
    pub stats: ScanStats,
    pub crawl: Vec<CrawlRecord>,
    pub vulns: Vec<VulnerabilityRecord>,
    /// Reason of a surfaced start failure, if any.
    pub last_error: Option<String>,
}

impl WatchSnapshot {
    /// Whether the watched job reached done/finish/error.
    pub fn is_terminal(&self) -> bool {
        self.phase == WatchPhase::Terminal
    }
}
