//! Event stream consumption.
//!
//! A streamed task (chat) has no status endpoint to poll; instead the
//! server answers the submission with a long-lived response of
//! newline-delimited, `data: `-prefixed JSON frames. This module
//! reassembles frames from arbitrarily chunked bytes and emits them
//! incrementally.

mod consumer;
mod frame;

pub use consumer::{StreamConsumer, StreamHooks};
pub use frame::{decode_frame, FrameDecode, LineBuffer, DONE_SENTINEL, EVENT_PREFIX};
