//! Lifecycle composition for batch task kinds.

use std::sync::Arc;

use crate::client::BatchBackend;
use crate::error::BackendError;
use crate::monitor::{BatchHooks, BatchPollingCoordinator, PollOptions};
use crate::state::{BatchState, TaskId};

/// Tracks a whole batch (e.g. a parameter-sweep of backtests) under one
/// aggregate "all done" condition.
pub struct BatchLifecycleController<B: BatchBackend> {
    backend: Arc<B>,
    coordinator: BatchPollingCoordinator<B::Output>,
    ids: Vec<TaskId>,
    on_settled: Option<Arc<dyn Fn(&[TaskId]) + Send + Sync>>,
}

impl<B: BatchBackend> BatchLifecycleController<B> {
    pub fn new(backend: Arc<B>, options: PollOptions) -> Self {
        Self {
            backend,
            coordinator: BatchPollingCoordinator::new(options),
            ids: Vec::new(),
            on_settled: None,
        }
    }

    /// Injects the post-terminal hook, invoked once after the batch
    /// settled and the result fan-out finished.
    pub fn on_settled(mut self, hook: impl Fn(&[TaskId]) + Send + Sync + 'static) -> Self {
        self.on_settled = Some(Arc::new(hook));
        self
    }

    /// Submits the batch and starts the aggregate polling loop.
    pub async fn submit(&mut self, params: &B::Params) -> Result<Vec<TaskId>, BackendError> {
        let submissions = self.backend.submit_batch(params).await?;
        let ids: Vec<TaskId> = submissions.into_iter().map(|s| s.id).collect();
        tracing::debug!(count = ids.len(), "batch submitted");
        self.observe(ids.clone());
        Ok(ids)
    }

    /// Starts observing an already-submitted id set.
    pub fn observe(&mut self, ids: Vec<TaskId>) {
        self.ids = ids.clone();

        let status_backend = Arc::clone(&self.backend);
        let statuses = move |ids: Vec<TaskId>| {
            let backend = Arc::clone(&status_backend);
            async move { backend.statuses(&ids).await }
        };

        let result_backend = Arc::clone(&self.backend);
        let fetch_result = move |id: TaskId| {
            let backend = Arc::clone(&result_backend);
            async move { backend.result(&id).await }
        };

        let mut hooks = BatchHooks::new();
        if let Some(on_settled) = self.on_settled.clone() {
            let settled_ids = ids;
            hooks = hooks.on_complete(move |_state: &BatchState<B::Output>| {
                on_settled(&settled_ids);
            });
        }

        self.coordinator.start(self.ids.clone(), statuses, fetch_result, hooks);
    }

    /// Stops observing. No server-side cancel is issued; batch members
    /// are cancelled individually through their own endpoints.
    pub fn stop(&mut self) {
        self.coordinator.stop();
    }

    /// Snapshot of the aggregate batch state.
    pub fn state(&self) -> BatchState<B::Output> {
        self.coordinator.state()
    }

    pub fn is_polling(&self) -> bool {
        self.coordinator.is_polling()
    }

    pub fn is_all_done(&self) -> bool {
        self.coordinator.state().is_all_done()
    }

    pub fn progress(&self) -> f32 {
        self.coordinator.state().progress()
    }

    pub fn ids(&self) -> &[TaskId] {
        &self.ids
    }

    /// Waits until the batch settled and the result fan-out finished.
    pub async fn wait_settled(&mut self) {
        self.coordinator.join().await;
    }
}
