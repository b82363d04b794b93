//! Tracking core configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::monitor::{PollOptions, DEFAULT_BATCH_POLL_INTERVAL, DEFAULT_POLL_INTERVAL};

/// Configuration for the tracking core.
///
/// Deserializable so the host application can carry it inside its own
/// settings file; all fields fall back to the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Cadence of single-task status polling, in milliseconds.
    pub poll_interval_ms: u64,
    /// Cadence of batch aggregate polling, in milliseconds.
    pub batch_poll_interval_ms: u64,
    /// Fire the first poll immediately on start rather than waiting one
    /// interval.
    pub immediate: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            batch_poll_interval_ms: DEFAULT_BATCH_POLL_INTERVAL.as_millis() as u64,
            immediate: true,
        }
    }
}

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_batch_poll_interval(mut self, interval: Duration) -> Self {
        self.batch_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Options for a single-task polling engine.
    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(self.poll_interval_ms),
            immediate: self.immediate,
            enabled: true,
        }
    }

    /// Options for a batch coordinator.
    pub fn batch_poll_options(&self) -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(self.batch_poll_interval_ms),
            immediate: self.immediate,
            enabled: true,
        }
    }
}
