//! Single-task polling engine.
//!
//! Drives one logical task through a poll→evaluate→(stop|continue)
//! cycle. Two invariants eliminate the class of bugs where a stale
//! response mutates state after the task stopped mattering:
//!
//! - single-flight: the worker awaits the query inline and the timer
//!   skips missed ticks, so a tick that lands mid-flight is dropped,
//!   never queued or pipelined;
//! - teardown liveness: every state mutation races the engine's
//!   cancellation token, so a response that arrives after `stop()` is
//!   discarded silently.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;
use crate::monitor::PollOptions;
use crate::state::{PollPhase, PollState};

type BoxQuery<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, BackendError>> + Send + Sync>;
type BoxPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Callbacks fired by a [`PollingEngine`] worker.
pub struct PollHooks<T> {
    on_terminal: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&BackendError) + Send + Sync>>,
}

impl<T> PollHooks<T> {
    pub fn new() -> Self {
        Self {
            on_terminal: None,
            on_error: None,
        }
    }

    /// Fired exactly once per run, when the terminal predicate holds.
    pub fn on_terminal(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_terminal = Some(Arc::new(f));
        self
    }

    /// Fired when the query rejects. Polling does not resume.
    pub fn on_error(mut self, f: impl Fn(&BackendError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl<T> Default for PollHooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PollHooks<T> {
    fn clone(&self) -> Self {
        Self {
            on_terminal: self.on_terminal.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

/// Polls a status query on a fixed cadence until a terminal predicate
/// holds, the query rejects, or the engine is stopped.
pub struct PollingEngine<T> {
    options: PollOptions,
    state: Arc<Mutex<PollState<T>>>,
    query: Option<BoxQuery<T>>,
    is_terminal: Option<BoxPredicate<T>>,
    hooks: PollHooks<T>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl<T> PollingEngine<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(options: PollOptions) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(PollState::idle())),
            query: None,
            is_terminal: None,
            hooks: PollHooks::new(),
            cancel: CancellationToken::new(),
            worker: None,
        }
    }

    /// Begins a fresh polling run.
    ///
    /// Any previous run is stopped first. When the engine is disabled
    /// the query is recorded but nothing is armed until
    /// [`set_enabled`](Self::set_enabled).
    pub fn start<Q, Fut, P>(&mut self, query: Q, is_terminal: P, hooks: PollHooks<T>)
    where
        Q: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, BackendError>> + Send + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.halt_worker();
        *self.state.lock().unwrap() = PollState::idle();

        self.query = Some(Arc::new(move || query().boxed()));
        self.is_terminal = Some(Arc::new(is_terminal));
        self.hooks = hooks;

        if self.options.enabled {
            self.arm();
        }
    }

    /// Stops polling. Idempotent; no terminal or error callback fires,
    /// and a response from an in-flight query is discarded.
    pub fn stop(&mut self) {
        self.halt_worker();
        let mut state = self.state.lock().unwrap();
        state.is_polling = false;
        if state.phase == PollPhase::Polling {
            state.phase = PollPhase::Idle;
        }
    }

    /// Stops and returns to the pristine initial state, regardless of
    /// the prior phase.
    pub fn reset(&mut self) {
        self.halt_worker();
        *self.state.lock().unwrap() = PollState::idle();
    }

    /// Explicit gate for arming and disarming the timer, decoupled from
    /// any rendering concern. Enabling after a finished run (success or
    /// error) is a no-op; polling never resumes on its own.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.options.enabled = enabled;
        if enabled {
            self.arm();
        } else {
            self.stop();
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PollState<T> {
        self.state.lock().unwrap().clone()
    }

    /// True iff a timer is currently armed.
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

    fn arm(&mut self) {
        let (Some(query), Some(is_terminal)) = (self.query.clone(), self.is_terminal.clone())
        else {
            return;
        };
        if self.worker.as_ref().is_some_and(|w| !w.is_finished()) && self.is_polling() {
            return;
        }
        {
            let mut state = self.state.lock().unwrap();
            // A finished run stays finished; only idle or mid-run
            // engines may (re)arm.
            if matches!(state.phase, PollPhase::Success | PollPhase::Error) {
                return;
            }
            state.is_polling = true;
        }

        let token = self.cancel.clone();
        let state = Arc::clone(&self.state);
        let hooks = self.hooks.clone();
        let options = self.options.clone();

        self.worker = Some(tokio::spawn(async move {
            let mut ticker = time::interval(options.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !options.immediate {
                // An interval's first tick completes immediately;
                // consume it so the first poll waits one cadence.
                ticker.tick().await;
            }

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let outcome = tokio::select! {
                    _ = token.cancelled() => return,
                    outcome = (query)() => outcome,
                };
                if token.is_cancelled() {
                    // Torn down while the response was in flight.
                    return;
                }

                match outcome {
                    Ok(data) => {
                        let done = (is_terminal)(&data);
                        {
                            let mut st = state.lock().unwrap();
                            st.data = Some(data.clone());
                            st.error = None;
                            st.phase = if done {
                                PollPhase::Success
                            } else {
                                PollPhase::Polling
                            };
                            if done {
                                st.is_polling = false;
                            }
                        }
                        if done {
                            tracing::debug!("terminal status observed, polling stopped");
                            if let Some(on_terminal) = &hooks.on_terminal {
                                on_terminal(&data);
                            }
                            return;
                        }
                    }
                    Err(err) => {
                        {
                            let mut st = state.lock().unwrap();
                            st.phase = PollPhase::Error;
                            st.error = Some(err.clone());
                            st.is_polling = false;
                        }
                        tracing::debug!(error = %err, "status query failed, polling stopped");
                        if let Some(on_error) = &hooks.on_error {
                            on_error(&err);
                        }
                        return;
                    }
                }
            }
        }));
    }
}

impl<T> Drop for PollingEngine<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rstest::rstest;
    use tokio::time::Instant;

    use super::*;
    use crate::state::{StatusSnapshot, TaskStatus};

    fn snapshot(status: TaskStatus) -> StatusSnapshot {
        StatusSnapshot::new("t1", status)
    }

    /// Query that pops scripted outcomes and counts its calls.
    struct Script {
        calls: Arc<AtomicUsize>,
        outcomes: Arc<Mutex<VecDeque<Result<StatusSnapshot, BackendError>>>>,
    }

    impl Script {
        fn new(outcomes: Vec<Result<StatusSnapshot, BackendError>>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                outcomes: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            }
        }

        fn query(
            &self,
        ) -> impl Fn() -> futures::future::Ready<Result<StatusSnapshot, BackendError>>
               + Send
               + Sync
               + 'static {
            let calls = Arc::clone(&self.calls);
            let outcomes = Arc::clone(&self.outcomes);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                let outcome = outcomes
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(snapshot(TaskStatus::Running)));
                futures::future::ready(outcome)
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn terminal(s: &StatusSnapshot) -> bool {
        s.status.is_terminal()
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_on_first_immediate_poll_queries_once() {
        let script = Script::new(vec![Ok(snapshot(TaskStatus::Completed))]);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_count = Arc::clone(&fired);

        let mut engine = PollingEngine::new(PollOptions::default());
        engine.start(
            script.query(),
            terminal,
            PollHooks::new().on_terminal(move |_| {
                fired_count.fetch_add(1, Ordering::SeqCst);
            }),
        );
        engine.join().await;

        assert_eq!(script.call_count(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let state = engine.state();
        assert_eq!(state.phase, PollPhase::Success);
        assert!(!state.is_polling);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_cadence_until_terminal() {
        let script = Script::new(vec![
            Ok(snapshot(TaskStatus::Pending)),
            Ok(snapshot(TaskStatus::Running)),
            Ok(snapshot(TaskStatus::Completed)),
        ]);
        let times: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

        let inner = script.query();
        let stamps = Arc::clone(&times);
        let query = move || {
            stamps.lock().unwrap().push(Instant::now());
            inner()
        };

        let mut engine = PollingEngine::new(PollOptions::default());
        engine.start(query, terminal, PollHooks::new());
        engine.join().await;

        assert_eq!(script.call_count(), 3);
        let times = times.lock().unwrap();
        assert!(times[1] - times[0] >= Duration::from_secs(2));
        assert!(times[2] - times[1] >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_query_never_overlaps_itself() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));

        let gauge = Arc::clone(&concurrent);
        let high = Arc::clone(&max_seen);
        let count = Arc::clone(&calls);
        // Each call takes 5s against a 2s interval.
        let query = move || {
            let n = gauge.fetch_add(1, Ordering::SeqCst) + 1;
            high.fetch_max(n, Ordering::SeqCst);
            let call = count.fetch_add(1, Ordering::SeqCst);
            let gauge = Arc::clone(&gauge);
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                gauge.fetch_sub(1, Ordering::SeqCst);
                if call >= 2 {
                    Ok(snapshot(TaskStatus::Completed))
                } else {
                    Ok(snapshot(TaskStatus::Running))
                }
            }
        };

        let mut engine = PollingEngine::new(PollOptions::default());
        engine.start(query, terminal, PollHooks::new());
        engine.join().await;

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(engine.state().phase, PollPhase::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn query_failure_stops_polling_without_retry() {
        let script = Script::new(vec![
            Ok(snapshot(TaskStatus::Running)),
            Err(BackendError::Transport("connection refused".into())),
        ]);
        let errors = Arc::new(AtomicUsize::new(0));
        let error_count = Arc::clone(&errors);

        let mut engine = PollingEngine::new(PollOptions::default());
        engine.start(
            script.query(),
            terminal,
            PollHooks::new().on_error(move |_| {
                error_count.fetch_add(1, Ordering::SeqCst);
            }),
        );
        engine.join().await;

        // Give any (wrongly) surviving timer room to fire again.
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(script.call_count(), 2);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        let state = engine.state();
        assert_eq!(state.phase, PollPhase::Error);
        assert_eq!(
            state.error,
            Some(BackendError::Transport("connection refused".into()))
        );
        assert!(!state.is_polling);
    }

    #[tokio::test(start_paused = true)]
    async fn response_arriving_after_stop_is_discarded() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_count = Arc::clone(&fired);

        // In flight for 10s; we stop at ~1s.
        let query = || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(snapshot(TaskStatus::Completed))
        };

        let mut engine = PollingEngine::new(PollOptions::default());
        engine.start(
            query,
            terminal,
            PollHooks::new().on_terminal(move |_| {
                fired_count.fetch_add(1, Ordering::SeqCst);
            }),
        );

        // Let the worker enter the query.
        tokio::task::yield_now().await;
        engine.stop();
        engine.join().await;
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        let state = engine.state();
        assert_eq!(state.phase, PollPhase::Idle);
        assert!(state.data.is_none());
        assert!(!state.is_polling);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let script = Script::new(vec![Ok(snapshot(TaskStatus::Running))]);
        let mut engine = PollingEngine::new(PollOptions::default());
        engine.start(script.query(), terminal, PollHooks::new());

        engine.stop();
        engine.stop();
        engine.stop();

        assert_eq!(engine.state().phase, PollPhase::Idle);
        assert!(!engine.is_polling());
    }

    #[rstest]
    #[case::idle("idle")]
    #[case::polling("polling")]
    #[case::success("success")]
    #[case::error("error")]
    #[tokio::test(start_paused = true)]
    async fn reset_from_any_phase_restores_initial_state(#[case] drive_to: &str) {
        let mut engine: PollingEngine<StatusSnapshot> =
            PollingEngine::new(PollOptions::default());

        match drive_to {
            "idle" => {}
            "polling" => {
                let script = Script::new(vec![Ok(snapshot(TaskStatus::Running))]);
                engine.start(script.query(), terminal, PollHooks::new());
                tokio::task::yield_now().await;
                assert_eq!(engine.state().phase, PollPhase::Polling);
            }
            "success" => {
                let script = Script::new(vec![Ok(snapshot(TaskStatus::Completed))]);
                engine.start(script.query(), terminal, PollHooks::new());
                engine.join().await;
                assert_eq!(engine.state().phase, PollPhase::Success);
            }
            "error" => {
                let script =
                    Script::new(vec![Err(BackendError::Transport("boom".into()))]);
                engine.start(script.query(), terminal, PollHooks::new());
                engine.join().await;
                assert_eq!(engine.state().phase, PollPhase::Error);
            }
            _ => unreachable!(),
        }

        engine.reset();

        let state = engine.state();
        assert_eq!(state.phase, PollPhase::Idle);
        assert!(state.data.is_none());
        assert!(state.error.is_none());
        assert!(!state.is_polling);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_false_waits_one_interval() {
        let script = Script::new(vec![Ok(snapshot(TaskStatus::Completed))]);
        let started = Instant::now();
        let polled_at: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

        let inner = script.query();
        let stamp = Arc::clone(&polled_at);
        let query = move || {
            *stamp.lock().unwrap() = Some(Instant::now());
            inner()
        };

        let mut engine =
            PollingEngine::new(PollOptions::default().with_immediate(false));
        engine.start(query, terminal, PollHooks::new());
        engine.join().await;

        let polled_at = polled_at.lock().unwrap().unwrap();
        assert!(polled_at - started >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_engine_arms_nothing_until_enabled() {
        let script = Script::new(vec![Ok(snapshot(TaskStatus::Completed))]);

        let mut engine = PollingEngine::new(PollOptions::default().with_enabled(false));
        engine.start(script.query(), terminal, PollHooks::new());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(script.call_count(), 0);
        assert!(!engine.is_polling());

        engine.set_enabled(true);
        engine.join().await;
        assert_eq!(script.call_count(), 1);
        assert_eq!(engine.state().phase, PollPhase::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn enable_after_finished_run_does_not_resume() {
        let script = Script::new(vec![Err(BackendError::Transport("boom".into()))]);

        let mut engine = PollingEngine::new(PollOptions::default());
        engine.start(script.query(), terminal, PollHooks::new());
        engine.join().await;
        assert_eq!(engine.state().phase, PollPhase::Error);

        engine.set_enabled(true);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(script.call_count(), 1);
        assert_eq!(engine.state().phase, PollPhase::Error);
    }
}
