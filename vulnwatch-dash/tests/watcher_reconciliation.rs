//! End-to-end reconciliation tests for the job watcher.
//!
//! A scripted `ScanApi` plays the scan server; push notifications are
//! injected directly into the channel the SSE pump would normally feed.
//! Time is paused, so poll ticks and scripted delays run on the virtual
//! clock and the tests stay deterministic.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use vulnwatch_dash::api_client::ScanApi;
use vulnwatch_dash::error::{DashError, Result};
use vulnwatch_dash::watcher::{JobWatcher, POLL_PERIOD, WatchPhase, WatchSnapshot};
use vulnwatch_model::{
    CrawlRecord, Job, JobId, JobStatus, NotificationEvent, StartScanResponse, StatusPayload,
    VulnerabilityRecord,
};

type Scripted<T> = Mutex<VecDeque<std::result::Result<T, String>>>;

/// Scripted stand-in for the scan server. Response queues are sticky: the
/// last entry repeats once the queue is down to one element.
#[derive(Default)]
struct ScriptedApi {
    start: Scripted<StartScanResponse>,
    status: Scripted<StatusPayload>,
    crawl: Scripted<Vec<CrawlRecord>>,
    vulns: Scripted<Vec<VulnerabilityRecord>>,
    /// Per-job crawl override with an artificial delay, for staleness tests.
    crawl_overrides: Mutex<HashMap<String, (Duration, Vec<CrawlRecord>)>>,
    jobs: Mutex<Vec<Job>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls_matching(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn script<T>(queue: &Scripted<T>, responses: Vec<std::result::Result<T, String>>) {
        *queue.lock().unwrap() = responses.into();
    }
}

fn next_scripted<T: Clone>(queue: &Scripted<T>) -> std::result::Result<T, String> {
    let mut queue = queue.lock().unwrap();
    match queue.len() {
        0 => Err("unscripted call".to_string()),
        1 => queue.front().cloned().unwrap(),
        _ => queue.pop_front().unwrap(),
    }
}

#[async_trait]
impl ScanApi for ScriptedApi {
    async fn start_scan(&self, domain: &str) -> Result<StartScanResponse> {
        self.record(format!("start:{domain}"));
        next_scripted(&self.start).map_err(DashError::request)
    }

    async fn scan_status(&self, job_id: &JobId) -> Result<StatusPayload> {
        self.record(format!("status:{job_id}"));
        next_scripted(&self.status).map_err(DashError::request)
    }

    async fn crawl_results(&self, job_id: &JobId) -> Result<Vec<CrawlRecord>> {
        self.record(format!("crawl:{job_id}"));
        let override_for_job = self
            .crawl_overrides
            .lock()
            .unwrap()
            .get(job_id.as_str())
            .cloned();
        if let Some((delay, rows)) = override_for_job {
            tokio::time::sleep(delay).await;
            return Ok(rows);
        }
        next_scripted(&self.crawl).map_err(DashError::request)
    }

    async fn vulnerability_results(&self, job_id: &JobId) -> Result<Vec<VulnerabilityRecord>> {
        self.record(format!("vulns:{job_id}"));
        next_scripted(&self.vulns).map_err(DashError::request)
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.record("list".to_string());
        Ok(self.jobs.lock().unwrap().clone())
    }
}

fn crawl_rows(job: &str, n: usize) -> Vec<CrawlRecord> {
    (0..n)
        .map(|i| CrawlRecord {
            id: Some(i as i64),
            url: format!("https://{job}.example.com/{i}"),
            created_at: None,
        })
        .collect()
}

fn finding(url: &str) -> VulnerabilityRecord {
    VulnerabilityRecord {
        url: url.to_string(),
        risk: "High".to_string(),
        details: "parameter reflects payload".to_string(),
    }
}

fn history_entry(job_id: &str, status: JobStatus) -> Job {
    Job {
        id: Some(1),
        job_id: JobId::from(job_id),
        domain: "example.com".to_string(),
        status,
        progress: 0,
        created_at: None,
        updated_at: None,
        finish_at: None,
    }
}

/// Wait (on the virtual clock) until a published snapshot satisfies the
/// predicate.
async fn wait_for(
    snapshots: &mut watch::Receiver<WatchSnapshot>,
    pred: impl Fn(&WatchSnapshot) -> bool,
) -> WatchSnapshot {
    {
        let current = snapshots.borrow_and_update().clone();
        if pred(&current) {
            return current;
        }
    }
    loop {
        tokio::time::timeout(Duration::from_secs(60), snapshots.changed())
            .await
            .expect("timed out waiting for a matching snapshot")
            .expect("watcher task ended");
        let current = snapshots.borrow_and_update().clone();
        if pred(&current) {
            return current;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn start_poll_then_push_completion() {
    let api = std::sync::Arc::new(ScriptedApi::default());
    ScriptedApi::script(
        &api.start,
        vec![Ok(StartScanResponse {
            job_id: JobId::from("j1"),
        })],
    );
    ScriptedApi::script(
        &api.status,
        vec![Ok(StatusPayload {
            status: JobStatus::Running,
            progress: 20,
        })],
    );
    ScriptedApi::script(&api.crawl, vec![Ok(crawl_rows("j1", 2))]);
    ScriptedApi::script(&api.vulns, vec![Ok(Vec::new())]);

    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let handle = JobWatcher::spawn(api.clone(), push_rx);
    let mut snapshots = handle.snapshots();

    handle.start("example.com");
    let running = wait_for(&mut snapshots, |s| {
        s.status == JobStatus::Running && s.stats.total == 2
    })
    .await;
    assert_eq!(running.phase, WatchPhase::Watching);
    assert_eq!(running.step.index(), 1);
    assert_eq!(running.stats.safe, 2);

    // Push arrives between polls and completes the job immediately.
    push_tx
        .send(NotificationEvent::now("j1", "Job finished"))
        .unwrap();
    let done = wait_for(&mut snapshots, |s| s.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(done.step.index(), 3);

    // Polling stops at terminal: no further status fetches, ever.
    let status_calls = api.calls_matching("status:");
    tokio::time::sleep(5 * POLL_PERIOD).await;
    assert_eq!(api.calls_matching("status:"), status_calls);
}

#[tokio::test(start_paused = true)]
async fn failed_vuln_fetch_keeps_prior_values() {
    let api = std::sync::Arc::new(ScriptedApi::default());
    ScriptedApi::script(
        &api.start,
        vec![Ok(StartScanResponse {
            job_id: JobId::from("j1"),
        })],
    );
    ScriptedApi::script(
        &api.status,
        vec![Ok(StatusPayload {
            status: JobStatus::Running,
            progress: 40,
        })],
    );
    ScriptedApi::script(&api.crawl, vec![Ok(crawl_rows("j1", 3))]);
    // First fetch succeeds, every later one fails.
    ScriptedApi::script(
        &api.vulns,
        vec![
            Ok(vec![finding("https://j1.example.com/0")]),
            Err("database temporarily unavailable".to_string()),
        ],
    );

    let (_push_tx, push_rx) = mpsc::unbounded_channel();
    let handle = JobWatcher::spawn(api.clone(), push_rx);
    let mut snapshots = handle.snapshots();

    handle.start("example.com");
    wait_for(&mut snapshots, |s| s.stats.vulnerable == 1).await;

    // Let several more ticks (with failing vuln fetches) go by.
    tokio::time::sleep(4 * POLL_PERIOD).await;
    assert!(api.calls_matching("vulns:") >= 3);

    let snapshot = snapshots.borrow().clone();
    assert_eq!(snapshot.stats.total, 3, "crawl keeps updating");
    assert_eq!(snapshot.stats.vulnerable, 1, "vuln count retains prior value");
    assert_eq!(snapshot.phase, WatchPhase::Watching);
    assert!(snapshot.last_error.is_none(), "tick failures are not surfaced");
}

#[tokio::test(start_paused = true)]
async fn switching_jobs_discards_stale_results() {
    let api = std::sync::Arc::new(ScriptedApi::default());
    ScriptedApi::script(
        &api.start,
        vec![
            Ok(StartScanResponse {
                job_id: JobId::from("jA"),
            }),
            Ok(StartScanResponse {
                job_id: JobId::from("jB"),
            }),
        ],
    );
    ScriptedApi::script(
        &api.status,
        vec![Ok(StatusPayload {
            status: JobStatus::Running,
            progress: 10,
        })],
    );
    ScriptedApi::script(&api.vulns, vec![Ok(Vec::new())]);
    // Job A's crawl fetch is slow; its result lands only after the switch.
    api.crawl_overrides.lock().unwrap().insert(
        "jA".to_string(),
        (Duration::from_secs(5), crawl_rows("jA", 5)),
    );
    api.crawl_overrides
        .lock()
        .unwrap()
        .insert("jB".to_string(), (Duration::ZERO, crawl_rows("jB", 1)));

    let (_push_tx, push_rx) = mpsc::unbounded_channel();
    let handle = JobWatcher::spawn(api.clone(), push_rx);
    let mut snapshots = handle.snapshots();

    handle.start("a.example.com");
    wait_for(&mut snapshots, |s| {
        s.job_id.as_ref().map(JobId::as_str) == Some("jA")
    })
    .await;

    // Switch before job A's crawl resolves.
    handle.start("b.example.com");
    let watching_b = wait_for(&mut snapshots, |s| {
        s.job_id.as_ref().map(JobId::as_str) == Some("jB") && s.stats.total == 1
    })
    .await;
    assert!(watching_b.crawl[0].url.contains("jB"));

    // Job A's 5-second crawl response arrives now; it must not leak into
    // job B's displayed state.
    tokio::time::sleep(Duration::from_secs(6)).await;
    let snapshot = snapshots.borrow().clone();
    assert_eq!(snapshot.job_id.as_ref().map(JobId::as_str), Some("jB"));
    assert_eq!(snapshot.stats.total, 1);
    assert!(snapshot.crawl.iter().all(|row| row.url.contains("jB")));
}

#[tokio::test(start_paused = true)]
async fn push_for_unwatched_job_is_ignored() {
    let api = std::sync::Arc::new(ScriptedApi::default());
    ScriptedApi::script(
        &api.start,
        vec![Ok(StartScanResponse {
            job_id: JobId::from("j1"),
        })],
    );
    ScriptedApi::script(
        &api.status,
        vec![Ok(StatusPayload {
            status: JobStatus::Running,
            progress: 50,
        })],
    );
    ScriptedApi::script(&api.crawl, vec![Ok(crawl_rows("j1", 1))]);
    ScriptedApi::script(&api.vulns, vec![Ok(Vec::new())]);

    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let handle = JobWatcher::spawn(api.clone(), push_rx);
    let mut snapshots = handle.snapshots();

    handle.start("example.com");
    wait_for(&mut snapshots, |s| s.status == JobStatus::Running).await;

    push_tx
        .send(NotificationEvent::now("jX", "Job finished"))
        .unwrap();
    tokio::time::sleep(2 * POLL_PERIOD).await;
    let snapshot = snapshots.borrow_and_update().clone();
    assert_eq!(snapshot.phase, WatchPhase::Watching, "foreign push ignored");
    assert_eq!(snapshot.status, JobStatus::Running);

    // The matching job id still completes the session.
    push_tx
        .send(NotificationEvent::now("j1", "Job finished"))
        .unwrap();
    let done = wait_for(&mut snapshots, |s| s.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn start_failure_is_surfaced_and_never_polls() {
    let api = std::sync::Arc::new(ScriptedApi::default());
    ScriptedApi::script(
        &api.start,
        vec![Err("Invalid input: 'domain' is required".to_string())],
    );

    let (_push_tx, push_rx) = mpsc::unbounded_channel();
    let handle = JobWatcher::spawn(api.clone(), push_rx);
    let mut snapshots = handle.snapshots();

    handle.start("");
    let failed = wait_for(&mut snapshots, |s| s.last_error.is_some()).await;
    assert_eq!(failed.phase, WatchPhase::Idle);
    assert_eq!(failed.status, JobStatus::Error);

    tokio::time::sleep(5 * POLL_PERIOD).await;
    assert_eq!(api.calls_matching("status:"), 0);
    assert_eq!(api.calls_matching("crawl:"), 0);
}

#[tokio::test(start_paused = true)]
async fn opening_finished_history_entry_fetches_lists_without_polling() {
    let api = std::sync::Arc::new(ScriptedApi::default());
    ScriptedApi::script(&api.crawl, vec![Ok(crawl_rows("j9", 2))]);
    ScriptedApi::script(
        &api.vulns,
        vec![Ok(vec![finding("https://j9.example.com/0")])],
    );

    let (_push_tx, push_rx) = mpsc::unbounded_channel();
    let handle = JobWatcher::spawn(api.clone(), push_rx);
    let mut snapshots = handle.snapshots();

    handle.open(history_entry("j9", JobStatus::Finish));
    let snapshot = wait_for(&mut snapshots, |s| {
        s.is_terminal() && s.stats.total == 2 && s.stats.vulnerable == 1
    })
    .await;
    assert_eq!(snapshot.status, JobStatus::Finish);
    assert_eq!(snapshot.stats.safe, 1);

    tokio::time::sleep(5 * POLL_PERIOD).await;
    assert_eq!(api.calls_matching("status:"), 0, "terminal entries are not polled");
    assert_eq!(api.calls_matching("crawl:"), 1, "lists fetched exactly once");
}
