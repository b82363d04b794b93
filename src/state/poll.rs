//! Poll state machine for a single tracked task.

use crate::error::BackendError;

/// Phase of a polling cycle.
///
/// `Success` means the last fetched data satisfied the terminal
/// predicate; `Error` means the query rejected and polling stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Polling,
    Success,
    Error,
}

/// Observable state of one [`PollingEngine`](crate::monitor::PollingEngine).
///
/// Mutated only by the owning engine's worker; views read snapshots.
/// `is_polling` is true iff a timer is currently armed.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState<T> {
    pub phase: PollPhase,
    pub data: Option<T>,
    pub error: Option<BackendError>,
    pub is_polling: bool,
}

impl<T> PollState<T> {
    /// The pristine state before `start` and after `reset`.
    pub fn idle() -> Self {
        Self {
            phase: PollPhase::Idle,
            data: None,
            error: None,
            is_polling: false,
        }
    }
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self::idle()
    }
}
