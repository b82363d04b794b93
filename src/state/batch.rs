//! Aggregate state for a batch of concurrently tracked tasks.

use std::collections::HashMap;

use crate::error::BackendError;
use crate::state::{TaskId, TaskStatus, TaskStatusRecord};

/// Observable state of one
/// [`BatchPollingCoordinator`](crate::monitor::BatchPollingCoordinator).
///
/// `results` holds an entry for id `x` iff `x` was last observed
/// `Completed` or `Failed`; cancelled members never acquire one. All
/// counters derive from `tasks` on every call, so they cannot drift
/// from the authoritative statuses.
#[derive(Debug, Clone)]
pub struct BatchState<R> {
    pub tasks: Vec<TaskStatusRecord>,
    pub results: HashMap<TaskId, R>,
    pub error: Option<BackendError>,
    pub is_polling: bool,
}

impl<R> BatchState<R> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            results: HashMap::new(),
            error: None,
            is_polling: false,
        }
    }

    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed_count(&self) -> usize {
        self.count(|r| r.status == TaskStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(|r| r.status == TaskStatus::Failed)
    }

    pub fn cancelled_count(&self) -> usize {
        self.count(|r| r.status == TaskStatus::Cancelled)
    }

    pub fn running_count(&self) -> usize {
        self.count(|r| !r.status.is_terminal())
    }

    /// Fraction of members that finished with a result, in `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        (self.completed_count() + self.failed_count()) as f32 / self.tasks.len() as f32
    }

    /// True iff every member's status is terminal.
    pub fn is_all_done(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|r| r.status.is_terminal())
    }

    fn count(&self, pred: impl Fn(&TaskStatusRecord) -> bool) -> usize {
        self.tasks.iter().filter(|r| pred(r)).count()
    }
}

impl<R> Default for BatchState<R> {
    fn default() -> Self {
        Self::new()
    }
}
