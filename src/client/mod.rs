//! Ports to the platform's REST and streaming endpoints.
//!
//! The tracking core stays agnostic to the concrete transport; the host
//! application implements these traits on top of its HTTP client. The
//! obligations per method:
//!
//! - `status` is called repeatedly and must be idempotent and safe to
//!   call more often than it is answered.
//! - `result` is called at most once per id, only after that id was
//!   observed `Completed` or `Failed`.
//! - `submit` / `submit_batch` are called exactly once per logical task.
//! - `cancel` is best-effort and fire-and-forget.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{BackendError, StreamError};
use crate::state::{StatusSnapshot, Submission, TaskId, TaskStatusRecord};

/// Raw byte chunks of a long-lived streaming response. Chunk boundaries
/// are arbitrary with respect to logical event boundaries.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, StreamError>>;

/// Endpoints for one polled task kind.
#[async_trait]
pub trait TaskBackend: Send + Sync + 'static {
    /// Submission parameters, e.g. a backtest configuration.
    type Params: Send + Sync;
    /// Final result fetched after the task settles.
    type Output: Clone + Send + Sync + 'static;

    async fn submit(&self, params: &Self::Params) -> Result<Submission, BackendError>;

    async fn status(&self, id: &TaskId) -> Result<StatusSnapshot, BackendError>;

    async fn result(&self, id: &TaskId) -> Result<Self::Output, BackendError>;

    async fn cancel(&self, id: &TaskId) -> Result<(), BackendError>;
}

/// Endpoints for a batch task kind whose statuses are served by one
/// aggregate query.
#[async_trait]
pub trait BatchBackend: Send + Sync + 'static {
    type Params: Send + Sync;
    type Output: Clone + Send + Sync + 'static;

    /// Submit the whole batch, returning one submission per member.
    async fn submit_batch(
        &self,
        params: &Self::Params,
    ) -> Result<Vec<Submission>, BackendError>;

    /// One status row per requested id, in a single request.
    async fn statuses(&self, ids: &[TaskId]) -> Result<Vec<TaskStatusRecord>, BackendError>;

    async fn result(&self, id: &TaskId) -> Result<Self::Output, BackendError>;
}

/// An endpoint that answers a JSON body with a long-lived response of
/// newline-delimited, `data: `-prefixed event frames.
#[async_trait]
pub trait EventStreamSource: Send + Sync + 'static {
    async fn open(&self, body: serde_json::Value) -> Result<ByteStream, BackendError>;
}
