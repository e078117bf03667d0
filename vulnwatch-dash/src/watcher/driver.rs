//! Async driver for the watch session.
//!
//! Owns the session, the poll timer and the fan-out of fetch tasks. All
//! state changes go through [`WatchSession::apply`]; this module only turns
//! time and network completions into events and interprets the effects the
//! fold asks for.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior, interval};
use vulnwatch_model::{Job, NotificationEvent};

use crate::api_client::ScanApi;

use super::session::{Effect, WatchEvent, WatchSession, WatchSnapshot};

/// Period of the status/crawl/vulnerability polling loop.
pub const POLL_PERIOD: Duration = Duration::from_secs(2);

/// Commands accepted by a running watcher.
#[derive(Debug)]
pub enum WatchCommand {
    /// Start a new scan for a domain and watch it.
    Start { domain: String },
    /// Watch an existing job, e.g. one picked from the history view.
    Open { job: Job },
    /// Stop watching and return to idle.
    Close,
}

/// Handle to a spawned [`JobWatcher`] task.
///
/// Dropping the handle shuts the watcher down.
#[derive(Debug)]
pub struct WatcherHandle {
    commands: mpsc::UnboundedSender<WatchCommand>,
    snapshots: watch::Receiver<WatchSnapshot>,
    task: tokio::task::JoinHandle<()>,
}

impl WatcherHandle {
    /// Start a new scan, replacing whatever was watched before.
    pub fn start(&self, domain: impl Into<String>) {
        let _ = self.commands.send(WatchCommand::Start {
            domain: domain.into(),
        });
    }

    /// Watch an existing job, replacing whatever was watched before.
    pub fn open(&self, job: Job) {
        let _ = self.commands.send(WatchCommand::Open { job });
    }

    /// Stop watching the current job.
    pub fn close(&self) {
        let _ = self.commands.send(WatchCommand::Close);
    }

    /// A receiver over the stream of published snapshots.
    pub fn snapshots(&self) -> watch::Receiver<WatchSnapshot> {
        self.snapshots.clone()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The driver task behind a [`WatcherHandle`].
pub struct JobWatcher {
    api: Arc<dyn ScanApi>,
    session: WatchSession,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    snapshot_tx: watch::Sender<WatchSnapshot>,
    polling: bool,
}

impl std::fmt::Debug for JobWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobWatcher")
            .field("session", &self.session)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl JobWatcher {
    /// Spawn a watcher over the given API, fed by the given push receiver
    /// (see [`crate::notifications::NotificationChannel::subscribe`]).
    pub fn spawn(
        api: Arc<dyn ScanApi>,
        push: mpsc::UnboundedReceiver<NotificationEvent>,
    ) -> WatcherHandle {
        let session = WatchSession::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(session.snapshot());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let driver = JobWatcher {
            api,
            session,
            events_tx,
            snapshot_tx,
            polling: false,
        };
        let task = tokio::spawn(driver.run(commands_rx, push, events_rx));

        WatcherHandle {
            commands: commands_tx,
            snapshots,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<WatchCommand>,
        mut push: mpsc::UnboundedReceiver<NotificationEvent>,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
    ) {
        let mut ticker = interval(POLL_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut ticker),
                    // Every handle is gone; nothing can reach us anymore.
                    None => break,
                },
                // The push pump ending (pattern mismatch on None) just
                // disables this branch; polling carries on.
                Some(event) = push.recv() => {
                    self.fold(WatchEvent::PushReceived { event }, &mut ticker);
                }
                Some(event) = events.recv() => {
                    self.fold(event, &mut ticker);
                }
                _ = ticker.tick(), if self.polling => self.spawn_poll_fetches(),
            }
        }
    }

    fn handle_command(&mut self, command: WatchCommand, ticker: &mut Interval) {
        match command {
            WatchCommand::Start { domain } => {
                self.fold(WatchEvent::StartRequested { domain }, ticker);
            }
            WatchCommand::Open { job } => {
                self.fold(WatchEvent::JobOpened { job }, ticker);
            }
            WatchCommand::Close => {
                self.fold(WatchEvent::Closed, ticker);
            }
        }
    }

    /// Apply one event, interpret its effects, publish the new snapshot.
    fn fold(&mut self, event: WatchEvent, ticker: &mut Interval) {
        let effects = self.session.apply(event);
        for effect in effects {
            match effect {
                Effect::StartPolling => {
                    self.polling = true;
                    // First tick fires immediately so a fresh session shows
                    // data without waiting out a full period.
                    ticker.reset_immediately();
                }
                Effect::StopPolling => self.polling = false,
                Effect::RefreshLists => self.spawn_list_fetches(),
                Effect::IssueStart => self.spawn_start_request(),
            }
        }
        let _ = self.snapshot_tx.send(self.session.snapshot());
    }

    fn spawn_start_request(&self) {
        let Some(domain) = self.session.domain().map(str::to_string) else {
            return;
        };
        let epoch = self.session.epoch();
        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api
                .start_scan(&domain)
                .await
                .map(|response| response.job_id)
                .map_err(|e| e.to_string());
            let _ = tx.send(WatchEvent::StartCompleted { epoch, result });
        });
    }

    /// One poll tick: status plus both lists, as three independent fetches.
    /// Any of them may fail or finish out of order; the epoch guard in the
    /// fold is the only ordering discipline.
    fn spawn_poll_fetches(&self) {
        let Some(job_id) = self.session.job_id().cloned() else {
            return;
        };
        log::debug!("poll tick for job {job_id}");

        let epoch = self.session.epoch();
        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            match api.scan_status(&job_id).await {
                Ok(payload) => {
                    let _ = tx.send(WatchEvent::StatusFetched {
                        epoch,
                        status: payload.status,
                        progress: payload.progress,
                    });
                }
                // Skipped this tick, retried on the next one.
                Err(err) => log::debug!("status fetch failed: {err}"),
            }
        });

        self.spawn_list_fetches();
    }

    fn spawn_list_fetches(&self) {
        let Some(job_id) = self.session.job_id().cloned() else {
            return;
        };
        let epoch = self.session.epoch();

        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        let job = job_id.clone();
        tokio::spawn(async move {
            match api.crawl_results(&job).await {
                Ok(records) => {
                    let _ = tx.send(WatchEvent::CrawlFetched { epoch, records });
                }
                Err(err) => log::debug!("crawl fetch failed: {err}"),
            }
        });

        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            match api.vulnerability_results(&job_id).await {
                Ok(records) => {
                    let _ = tx.send(WatchEvent::VulnsFetched { epoch, records });
                }
                Err(err) => log::debug!("vulnerability fetch failed: {err}"),
            }
        });
    }
}
