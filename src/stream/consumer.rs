//! Incremental consumer for an abortable event stream.

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::stream::frame::{decode_frame, FrameDecode, LineBuffer};

/// Callbacks for one stream session.
pub struct StreamHooks<T> {
    /// Invoked once per fully reassembled, decoded event frame.
    pub on_frame: Box<dyn FnMut(T) + Send>,
    /// Invoked when a read fails for a reason other than cancellation.
    pub on_error: Option<Box<dyn FnOnce(StreamError) + Send>>,
    /// Invoked once when the sentinel arrives or the stream ends cleanly.
    pub on_done: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> StreamHooks<T> {
    pub fn new(on_frame: impl FnMut(T) + Send + 'static) -> Self {
        Self {
            on_frame: Box::new(on_frame),
            on_error: None,
            on_done: None,
        }
    }

    pub fn on_error(mut self, f: impl FnOnce(StreamError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_done(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_done = Some(Box::new(f));
        self
    }
}

/// Reads an abortable byte stream, reassembles newline-delimited frames
/// and emits decoded events incrementally.
///
/// The line buffer lives inside the worker and is dropped when the
/// stream closes or aborts; nothing is shared across sessions.
pub struct StreamConsumer {
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl StreamConsumer {
    /// Spawns a worker that drives `stream` to completion.
    pub fn spawn<T, S>(stream: S, hooks: StreamHooks<T>) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        S: Stream<Item = Result<Vec<u8>, StreamError>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let worker = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            let mut buffer = LineBuffer::new();
            let mut hooks = hooks;

            loop {
                let chunk = tokio::select! {
                    // An abort requested through `cancel()` is a normal,
                    // silent termination; it must win over a chunk that
                    // is already sitting in the transport buffer.
                    biased;
                    _ = token.cancelled() => return,
                    chunk = stream.next() => chunk,
                };
                if token.is_cancelled() {
                    return;
                }

                match chunk {
                    Some(Ok(bytes)) => {
                        for line in buffer.push(&bytes) {
                            match decode_frame::<T>(&line) {
                                FrameDecode::Event(event) => (hooks.on_frame)(event),
                                FrameDecode::Done => {
                                    // Stop reading immediately; the transport
                                    // may stay open longer than we care.
                                    if let Some(done) = hooks.on_done.take() {
                                        done();
                                    }
                                    return;
                                }
                                FrameDecode::Skip => {}
                            }
                        }
                    }
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "stream read failed");
                        if let Some(on_error) = hooks.on_error.take() {
                            on_error(err);
                        }
                        return;
                    }
                    None => {
                        // Clean close without the sentinel.
                        if let Some(done) = hooks.on_done.take() {
                            done();
                        }
                        return;
                    }
                }
            }
        });

        Self {
            cancel,
            worker: Some(worker),
        }
    }

    /// Aborts the session. Idempotent; no error or done callback fires.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the worker to finish.
    pub async fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
