//! Submit → observe → terminal result composition.
//!
//! A view never wires polling up by hand: it submits through a
//! controller, which stores the returned id, arms a polling engine on
//! the status endpoint and, once the task settles, fetches the final
//! result and fires the injected settle hook (the dashboard's cache
//! invalidation collaborator).

mod batch;
mod chat;
mod kinds;

pub use batch::BatchLifecycleController;
pub use chat::{ChatEvent, ChatSession, ChatTranscript};
pub use kinds::{
    BacktestParams, BacktestReport, PipelineRunParams, PipelineRunReport, PipelineStage,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::client::TaskBackend;
use crate::error::BackendError;
use crate::monitor::{PollHooks, PollOptions, PollingEngine};
use crate::state::{StatusSnapshot, TaskId, TaskStatus};

/// Result and error slot filled once the task settles.
struct Outcome<R> {
    result: Option<R>,
    error: Option<BackendError>,
}

impl<R> Outcome<R> {
    fn empty() -> Self {
        Self {
            result: None,
            error: None,
        }
    }
}

/// Tracks one task of kind `B` from submission to its terminal result.
pub struct TaskLifecycleController<B: TaskBackend> {
    backend: Arc<B>,
    engine: PollingEngine<StatusSnapshot>,
    task_id: Option<TaskId>,
    outcome: Arc<Mutex<Outcome<B::Output>>>,
    /// Local cancel override; authoritative for the UI even when the
    /// server-side cancel request fails or never answers.
    cancelled: Arc<AtomicBool>,
    settle_fetch: Arc<Mutex<Option<JoinHandle<()>>>>,
    on_settled: Option<Arc<dyn Fn(&TaskId) + Send + Sync>>,
}

impl<B: TaskBackend> TaskLifecycleController<B> {
    pub fn new(backend: Arc<B>, options: PollOptions) -> Self {
        Self {
            backend,
            engine: PollingEngine::new(options),
            task_id: None,
            outcome: Arc::new(Mutex::new(Outcome::empty())),
            cancelled: Arc::new(AtomicBool::new(false)),
            settle_fetch: Arc::new(Mutex::new(None)),
            on_settled: None,
        }
    }

    /// Injects the post-terminal hook, invoked after the task settled
    /// and any result fetch finished. Fire-and-forget from the
    /// controller's perspective.
    pub fn on_settled(mut self, hook: impl Fn(&TaskId) + Send + Sync + 'static) -> Self {
        self.on_settled = Some(Arc::new(hook));
        self
    }

    /// Submits the task and starts observing it.
    pub async fn submit(&mut self, params: &B::Params) -> Result<TaskId, BackendError> {
        let submission = self.backend.submit(params).await?;
        tracing::debug!(task = %submission.id, status = %submission.status, "task submitted");
        self.observe(submission.id.clone());
        Ok(submission.id)
    }

    /// Starts observing an already-submitted task.
    pub fn observe(&mut self, id: TaskId) {
        self.task_id = Some(id.clone());
        self.cancelled.store(false, Ordering::SeqCst);
        *self.outcome.lock().unwrap() = Outcome::empty();

        let backend = Arc::clone(&self.backend);
        let query_id = id.clone();
        let query = move || {
            let backend = Arc::clone(&backend);
            let id = query_id.clone();
            async move { backend.status(&id).await }
        };

        let backend = Arc::clone(&self.backend);
        let outcome = Arc::clone(&self.outcome);
        let cancelled = Arc::clone(&self.cancelled);
        let settle_fetch = Arc::clone(&self.settle_fetch);
        let on_settled = self.on_settled.clone();

        let hooks = PollHooks::new().on_terminal(move |snapshot: &StatusSnapshot| {
            let backend = Arc::clone(&backend);
            let outcome = Arc::clone(&outcome);
            let cancelled = Arc::clone(&cancelled);
            let on_settled = on_settled.clone();
            let id = id.clone();
            let fetch_result = snapshot.status.has_result();

            let handle = tokio::spawn(async move {
                if fetch_result {
                    match backend.result(&id).await {
                        Ok(result) => {
                            if cancelled.load(Ordering::SeqCst) {
                                return;
                            }
                            outcome.lock().unwrap().result = Some(result);
                        }
                        Err(err) => {
                            tracing::warn!(task = %id, error = %err, "result fetch failed");
                            if cancelled.load(Ordering::SeqCst) {
                                return;
                            }
                            outcome.lock().unwrap().error = Some(err);
                        }
                    }
                }
                if let Some(hook) = on_settled {
                    hook(&id);
                }
            });
            *settle_fetch.lock().unwrap() = Some(handle);
        });

        self.engine
            .start(query, |s: &StatusSnapshot| s.status.is_terminal(), hooks);
    }

    /// Issues a best-effort server-side cancel and locally forces the
    /// tracked status to `Cancelled`, whatever the server does. The UI
    /// must not hang on a confirmation a dead server never returns.
    pub fn cancel(&mut self) {
        let Some(id) = self.task_id.clone() else {
            return;
        };
        self.cancelled.store(true, Ordering::SeqCst);
        self.engine.stop();

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(err) = backend.cancel(&id).await {
                tracing::warn!(task = %id, error = %err, "server-side cancel failed");
            }
        });
    }

    /// The tracked status: the local cancel override, else the latest
    /// polled snapshot.
    pub fn status(&self) -> Option<TaskStatus> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Some(TaskStatus::Cancelled);
        }
        self.engine.state().data.map(|s| s.status)
    }

    /// Latest raw snapshot from the status endpoint.
    pub fn snapshot(&self) -> Option<StatusSnapshot> {
        self.engine.state().data
    }

    pub fn is_running(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst) && self.engine.is_polling()
    }

    pub fn is_completed(&self) -> bool {
        self.status() == Some(TaskStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        self.status() == Some(TaskStatus::Failed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == Some(TaskStatus::Cancelled)
    }

    /// Final result, present once a `Completed`/`Failed` task's result
    /// fetch succeeded.
    pub fn result(&self) -> Option<B::Output> {
        self.outcome.lock().unwrap().result.clone()
    }

    /// Polling-loop or result-fetch error, if any.
    pub fn error(&self) -> Option<BackendError> {
        if let Some(err) = self.engine.state().error {
            return Some(err);
        }
        self.outcome.lock().unwrap().error.clone()
    }

    pub fn task_id(&self) -> Option<&TaskId> {
        self.task_id.as_ref()
    }

    /// Waits until polling ended and any result fetch finished.
    pub async fn wait_settled(&mut self) {
        self.engine.join().await;
        let fetch = self.settle_fetch.lock().unwrap().take();
        if let Some(fetch) = fetch {
            let _ = fetch.await;
        }
    }
}
