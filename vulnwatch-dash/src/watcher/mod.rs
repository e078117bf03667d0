//! Job status watching: the session state machine and its async driver.

mod driver;
mod session;

pub use driver::{JobWatcher, POLL_PERIOD, WatchCommand, WatcherHandle};
pub use session::{
    Effect, NOTIFICATION_LOG_CAPACITY, WatchEvent, WatchPhase, WatchSession, WatchSnapshot,
};
