//! Observable state for tracked tasks.
//!
//! Every engine in this crate owns one of these state containers
//! exclusively and mutates it only from its own worker; views read
//! cloned snapshots and derive their flags from them.

mod batch;
mod poll;
mod task;

pub use batch::BatchState;
pub use poll::{PollPhase, PollState};
pub use task::{StatusSnapshot, Submission, TaskId, TaskStatus, TaskStatusRecord};
