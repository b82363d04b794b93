//! Batch polling coordinator.
//!
//! N parameter-sweep backtests must not produce N timers and N polling
//! loops. One timer drives one aggregate status query for the whole id
//! set, bounding request volume to one per tick regardless of batch
//! size. Once every member is terminal the final results are fetched
//! concurrently, and a single broken result endpoint cannot stall
//! observation of the rest of the batch.

use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;
use crate::monitor::PollOptions;
use crate::state::{BatchState, TaskId, TaskStatusRecord};

type BoxBatchQuery = Arc<
    dyn Fn(Vec<TaskId>) -> BoxFuture<'static, Result<Vec<TaskStatusRecord>, BackendError>>
        + Send
        + Sync,
>;
type BoxResultQuery<R> =
    Arc<dyn Fn(TaskId) -> BoxFuture<'static, Result<R, BackendError>> + Send + Sync>;

/// Callbacks fired by a [`BatchPollingCoordinator`] worker.
pub struct BatchHooks<R> {
    on_complete: Option<Arc<dyn Fn(&BatchState<R>) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&BackendError) + Send + Sync>>,
}

impl<R> BatchHooks<R> {
    pub fn new() -> Self {
        Self {
            on_complete: None,
            on_error: None,
        }
    }

    /// Fired once, after every member is terminal and the result
    /// fan-out finished.
    pub fn on_complete(mut self, f: impl Fn(&BatchState<R>) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Fired when the aggregate status query rejects.
    pub fn on_error(mut self, f: impl Fn(&BackendError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl<R> Default for BatchHooks<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for BatchHooks<R> {
    fn clone(&self) -> Self {
        Self {
            on_complete: self.on_complete.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

/// Fans a single timer tick into one aggregate status query for a set
/// of task ids, then fans out result fetches once all are terminal.
pub struct BatchPollingCoordinator<R> {
    options: PollOptions,
    state: Arc<Mutex<BatchState<R>>>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl<R> BatchPollingCoordinator<R>
where
    R: Clone + Send + 'static,
{
    pub fn new(options: PollOptions) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(BatchState::new())),
            cancel: CancellationToken::new(),
            worker: None,
        }
    }

    /// Begins polling the given ids.
    ///
    /// `statuses` must answer one row per requested id in a single
    /// request; `fetch_result` is called at most once per id, only for
    /// ids that ended `Completed` or `Failed`.
    pub fn start<Q, QFut, F, FFut>(
        &mut self,
        ids: Vec<TaskId>,
        statuses: Q,
        fetch_result: F,
        hooks: BatchHooks<R>,
    ) where
        Q: Fn(Vec<TaskId>) -> QFut + Send + Sync + 'static,
        QFut: std::future::Future<Output = Result<Vec<TaskStatusRecord>, BackendError>>
            + Send
            + 'static,
        F: Fn(TaskId) -> FFut + Send + Sync + 'static,
        FFut: std::future::Future<Output = Result<R, BackendError>> + Send + 'static,
    {
        self.halt_worker();
        {
            let mut state = self.state.lock().unwrap();
            *state = BatchState::new();
            state.is_polling = true;
        }

        // An empty batch has nothing to wait for: settle right away
        // instead of arming a timer that can never observe completion.
        if ids.is_empty() {
            let snapshot = {
                let mut state = self.state.lock().unwrap();
                state.is_polling = false;
                state.clone()
            };
            if let Some(on_complete) = &hooks.on_complete {
                on_complete(&snapshot);
            }
            return;
        }

        let statuses: BoxBatchQuery = Arc::new(move |ids| statuses(ids).boxed());
        let fetch_result: BoxResultQuery<R> = Arc::new(move |id| fetch_result(id).boxed());
        let token = self.cancel.clone();
        let state = Arc::clone(&self.state);
        let options = self.options.clone();

        self.worker = Some(tokio::spawn(async move {
            let mut ticker = time::interval(options.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !options.immediate {
                ticker.tick().await;
            }

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let outcome = tokio::select! {
                    _ = token.cancelled() => return,
                    outcome = (statuses)(ids.clone()) => outcome,
                };
                if token.is_cancelled() {
                    return;
                }

                match outcome {
                    Ok(records) => {
                        let all_done = {
                            let mut st = state.lock().unwrap();
                            st.tasks = records.clone();
                            st.is_all_done()
                        };
                        if !all_done {
                            continue;
                        }

                        // Timer is done with; flip before the fan-out so
                        // views see the batch as settled-in-progress.
                        state.lock().unwrap().is_polling = false;

                        let fetches = records
                            .iter()
                            .filter(|r| r.status.has_result())
                            .map(|r| {
                                let fetch = Arc::clone(&fetch_result);
                                let id = r.id.clone();
                                async move {
                                    let outcome = fetch(id.clone()).await;
                                    (id, outcome)
                                }
                            })
                            .collect::<Vec<_>>();

                        let fetched = tokio::select! {
                            _ = token.cancelled() => return,
                            fetched = join_all(fetches) => fetched,
                        };
                        if token.is_cancelled() {
                            return;
                        }

                        let snapshot = {
                            let mut st = state.lock().unwrap();
                            for (id, outcome) in fetched {
                                match outcome {
                                    Ok(result) => {
                                        st.results.insert(id, result);
                                    }
                                    // Fault-tolerant per id: the entry is
                                    // simply absent from the results map.
                                    Err(err) => {
                                        tracing::warn!(
                                            task = %id,
                                            error = %err,
                                            "result fetch failed for batch member"
                                        );
                                    }
                                }
                            }
                            st.clone()
                        };
                        if let Some(on_complete) = &hooks.on_complete {
                            on_complete(&snapshot);
                        }
                        return;
                    }
                    Err(err) => {
                        {
                            let mut st = state.lock().unwrap();
                            st.error = Some(err.clone());
                            st.is_polling = false;
                        }
                        tracing::debug!(error = %err, "aggregate status query failed");
                        if let Some(on_error) = &hooks.on_error {
                            on_error(&err);
                        }
                        return;
                    }
                }
            }
        }));
    }

    /// Stops polling. Idempotent.
    pub fn stop(&mut self) {
        self.halt_worker();
        self.state.lock().unwrap().is_polling = false;
    }

    /// Snapshot of the current batch state.
    pub fn state(&self) -> BatchState<R> {
        self.state.lock().unwrap().clone()
    }

    pub fn is_polling(&self) -> bool {
        self.state.lock().unwrap().is_polling
    }

    /// Waits for the current worker to finish, if one is running.
    pub async fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    fn halt_worker(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }
}

impl<R> Drop for BatchPollingCoordinator<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
