//! Error types shared across the tracking core.
//!
//! Engine-local failures are never rethrown into the caller's context;
//! they travel through poll state and hooks, so the variants here must
//! be cheap to clone.

use thiserror::Error;

use crate::state::TaskId;

/// Failure of a backend request (submit, status, result or cancel).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("service error (HTTP {status}): {message}")]
    Service { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The server does not know the task.
    #[error("task {0} not found")]
    NotFound(TaskId),
}

/// Failure of an event stream read loop.
///
/// Aborts requested through a consumer's `cancel()` are a normal
/// termination and never surface as one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The underlying byte stream yielded an error mid-read.
    #[error("stream transport error: {0}")]
    Transport(String),
}
