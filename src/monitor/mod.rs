//! Polling engines for observing long-running server-side jobs.
//!
//! There is no duplex channel to the server; these components drive a
//! poll→evaluate→(stop|continue) cycle against caller-supplied status
//! queries. Each engine owns its timer, state container and
//! cancellation token exclusively; nothing is shared across
//! concurrently tracked tasks.

mod batch;
mod poller;

pub use batch::{BatchHooks, BatchPollingCoordinator};
pub use poller::{PollHooks, PollingEngine};

use std::time::Duration;

/// Default cadence for single-task status polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default cadence for batch aggregate polling.
pub const DEFAULT_BATCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Options recognized by [`PollingEngine`] and
/// [`BatchPollingCoordinator`].
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Polling cadence.
    pub interval: Duration,
    /// Fire a poll immediately on start rather than waiting one
    /// interval.
    pub immediate: bool,
    /// Gate to auto start/stop. When false, `start` records the query
    /// but arms nothing until `set_enabled(true)`.
    pub enabled: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            immediate: true,
            enabled: true,
        }
    }
}

impl PollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
