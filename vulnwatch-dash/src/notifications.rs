//! Server push channel.
//!
//! Maintains a persistent SSE connection to the scan server's
//! `/notifications` scope and forwards decoded `scan_result` frames to the
//! watcher over an unbounded channel. Connection trouble is invisible to the
//! consumer: the pump reconnects with a bounded number of attempts and a
//! fixed backoff, and the consumer only ever sees delivered events.
//!
//! The stream is session-wide, not job-scoped: events for jobs other than
//! the watched one are delivered too, and filtering by job identity is the
//! watcher's responsibility.

use std::time::Duration;

use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::mpsc;
use vulnwatch_model::NotificationEvent;

/// SSE event name carrying job notifications.
const SCAN_RESULT_EVENT: &str = "scan_result";
/// Consecutive reconnect attempts before the pump gives up.
const MAX_RETRIES: u32 = 3;
/// Fixed delay between reconnect attempts.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Handle to a running push subscription.
///
/// Dropping (or [`close`](NotificationChannel::close)-ing) the handle aborts
/// the pump task and ends delivery.
#[derive(Debug)]
pub struct NotificationChannel {
    task: tokio::task::JoinHandle<()>,
}

impl NotificationChannel {
    /// Subscribe to the notification scope of a scan server.
    pub fn subscribe(
        base_url: &str,
    ) -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let url = format!("{}/notifications", base_url.trim_end_matches('/'));
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(pump(url, tx));
        (NotificationChannel { task }, rx)
    }

    /// Explicitly end the subscription.
    pub fn close(self) {
        self.task.abort();
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn pump(url: String, tx: mpsc::UnboundedSender<NotificationEvent>) {
    let mut retries: u32 = 0;
    loop {
        let mut source = EventSource::get(&url);
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {
                    log::info!("notification stream connected: {url}");
                    retries = 0;
                }
                Ok(Event::Message(frame)) => {
                    if let Some(notification) = decode_frame(&frame.event, &frame.data) {
                        if tx.send(notification).is_err() {
                            // Receiver gone; nobody is watching anymore.
                            return;
                        }
                    }
                }
                Err(err) => {
                    log::warn!("notification stream error: {err}");
                    break;
                }
            }
        }
        source.close();

        retries += 1;
        if retries > MAX_RETRIES {
            log::warn!(
                "notification channel unavailable after {MAX_RETRIES} reconnect attempts; \
                 relying on polling"
            );
            return;
        }
        log::debug!("reconnecting notification stream (attempt {retries}/{MAX_RETRIES})");
        tokio::time::sleep(RETRY_DELAY).await;
    }
}

/// Decode one SSE frame, skipping keepalives, foreign event names and
/// undecodable payloads.
fn decode_frame(event_name: &str, data: &str) -> Option<NotificationEvent> {
    if data.is_empty() || data == "keepalive" {
        log::debug!("notification keepalive");
        return None;
    }
    if event_name != SCAN_RESULT_EVENT {
        log::debug!("ignoring notification event '{event_name}'");
        return None;
    }
    match serde_json::from_str::<NotificationEvent>(data) {
        Ok(notification) => Some(notification),
        Err(err) => {
            log::warn!("undecodable {SCAN_RESULT_EVENT} frame: {err}");
            None
        }
    }
}
