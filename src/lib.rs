//! quantwatch
//!
//! Async task-tracking and streaming core for the quant research
//! dashboard. Lets a view observe long-running server-side jobs
//! (backtests, batch backtests, pipeline runs, LLM chat) that have no
//! persistent duplex channel:
//!
//! - [`monitor::PollingEngine`] drives one task through a
//!   poll→evaluate→(stop|continue) cycle.
//! - [`monitor::BatchPollingCoordinator`] tracks a whole id set under
//!   one timer and one aggregate query.
//! - [`stream::StreamConsumer`] reassembles newline-delimited event
//!   frames from an abortable, arbitrarily chunked byte stream.
//! - [`lifecycle`] composes submission, observation and result
//!   fetching into per-task-kind controllers.
//!
//! Transport, rendering and caching stay outside; the host wires them
//! in through the ports in [`client`].

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod state;
pub mod stream;

pub use config::WatchConfig;
pub use error::{BackendError, StreamError};
pub use state::{StatusSnapshot, Submission, TaskId, TaskStatus};
