//! Streamed chat session lifecycle.
//!
//! Chat is the one task kind without a status endpoint: the submission
//! response itself is the long-lived event stream. A best-effort live
//! view, not a data-integrity-critical channel.

use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::client::EventStreamSource;
use crate::error::{BackendError, StreamError};
use crate::stream::{StreamConsumer, StreamHooks};

/// One decoded chat event frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: String,
    /// Incremental text delta, when the event carries one.
    #[serde(default)]
    pub content: Option<String>,
}

/// Accumulated view of one chat exchange.
#[derive(Debug, Clone, Default)]
pub struct ChatTranscript {
    pub events: Vec<ChatEvent>,
    /// Concatenation of all content deltas so far.
    pub text: String,
    pub is_streaming: bool,
    pub error: Option<StreamError>,
}

/// Submits a chat request and consumes its event stream into a
/// transcript the view reads snapshots of.
pub struct ChatSession {
    source: Arc<dyn EventStreamSource>,
    consumer: Option<StreamConsumer>,
    transcript: Arc<Mutex<ChatTranscript>>,
}

impl ChatSession {
    pub fn new(source: Arc<dyn EventStreamSource>) -> Self {
        Self {
            source,
            consumer: None,
            transcript: Arc::new(Mutex::new(ChatTranscript::default())),
        }
    }

    /// Opens the stream for `body` and starts consuming it. Any
    /// previous exchange is aborted first, and its worker is awaited so
    /// it can never write into the new exchange's transcript.
    pub async fn send(&mut self, body: serde_json::Value) -> Result<(), BackendError> {
        if let Some(consumer) = self.consumer.take() {
            consumer.cancel();
            consumer.join().await;
        }
        self.transcript.lock().unwrap().is_streaming = false;
        let stream = self.source.open(body).await?;

        {
            let mut transcript = self.transcript.lock().unwrap();
            *transcript = ChatTranscript::default();
            transcript.is_streaming = true;
        }

        let sink = Arc::clone(&self.transcript);
        let done_sink = Arc::clone(&self.transcript);
        let error_sink = Arc::clone(&self.transcript);
        let hooks = StreamHooks::new(move |event: ChatEvent| {
            let mut transcript = sink.lock().unwrap();
            if let Some(content) = &event.content {
                transcript.text.push_str(content);
            }
            transcript.events.push(event);
        })
        .on_done(move || {
            done_sink.lock().unwrap().is_streaming = false;
        })
        .on_error(move |err| {
            let mut transcript = error_sink.lock().unwrap();
            transcript.is_streaming = false;
            transcript.error = Some(err);
        });

        self.consumer = Some(StreamConsumer::spawn(stream, hooks));
        Ok(())
    }

    /// Aborts the current exchange. The transcript keeps whatever
    /// arrived before the abort.
    pub fn cancel(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.cancel();
        }
        self.transcript.lock().unwrap().is_streaming = false;
    }

    /// Snapshot of the transcript so far.
    pub fn transcript(&self) -> ChatTranscript {
        self.transcript.lock().unwrap().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.transcript.lock().unwrap().is_streaming
    }

    /// Waits for the current exchange to finish.
    pub async fn wait_done(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.join().await;
        }
    }
}
