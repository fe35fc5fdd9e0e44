//! Duration-bounded admission controller
//!
//! Keeps up to `target_concurrency` user flows in flight until the deadline,
//! then stops launching and joins every outstanding flow before returning.
//!
//! Launches are gated by an admission semaphore whose capacity equals the
//! ceiling. A flow task gives back its slot in [`RunState`] before it
//! releases its permit, so the in-flight count can never be observed above
//! the ceiling.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info};

use crate::config::LoadTestConfig;
use crate::error::Result;
use crate::types::{FlowClock, FlowResult};

/// How long to wait before retrying admission against a full run state
const ADMISSION_RETRY: Duration = Duration::from_millis(10);

/// One simulated user's flow, launched once per user id
#[async_trait]
pub trait UserFlow: Send + Sync {
    /// Run the flow to completion. An `Err` is converted into a failed
    /// [`FlowResult`] by the controller.
    async fn execute(&self, user_id: u64) -> Result<FlowResult>;
}

/// Adapts an async closure into a [`UserFlow`]
pub struct FlowFn<F>(pub F);

#[async_trait]
impl<F, Fut> UserFlow for FlowFn<F>
where
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FlowResult>> + Send + 'static,
{
    async fn execute(&self, user_id: u64) -> Result<FlowResult> {
        (self.0)(user_id).await
    }
}

/// State shared between the controller and every flow task
#[derive(Debug)]
pub struct RunState {
    ceiling: usize,
    inner: Mutex<RunInner>,
}

#[derive(Debug, Default)]
struct RunInner {
    active: usize,
    peak_active: usize,
    launched: u64,
    results: Vec<FlowResult>,
}

impl RunState {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            inner: Mutex::new(RunInner::default()),
        }
    }

    /// Check the ceiling and take a slot in one step; returns the new user id
    pub fn try_admit(&self) -> Option<u64> {
        let mut inner = self.inner.lock();
        if inner.active >= self.ceiling {
            return None;
        }
        inner.active += 1;
        inner.peak_active = inner.peak_active.max(inner.active);
        inner.launched += 1;
        Some(inner.launched)
    }

    /// Give back a slot and record the flow's result; returns flows still active
    pub fn complete(&self, result: FlowResult) -> usize {
        let mut inner = self.inner.lock();
        inner.active = inner.active.saturating_sub(1);
        inner.results.push(result);
        inner.active
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn active(&self) -> usize {
        self.inner.lock().active
    }

    /// Highest in-flight count seen so far
    pub fn peak_active(&self) -> usize {
        self.inner.lock().peak_active
    }

    pub fn launched(&self) -> u64 {
        self.inner.lock().launched
    }

    pub fn completed(&self) -> usize {
        self.inner.lock().results.len()
    }

    /// Move the collected results out of the state
    pub fn take_results(&self) -> Vec<FlowResult> {
        std::mem::take(&mut self.inner.lock().results)
    }
}

/// Launches flows up to a concurrency ceiling until a deadline
#[derive(Debug, Clone)]
pub struct AdmissionController {
    duration: Duration,
    target_concurrency: usize,
    relaunch_delay: Duration,
}

impl AdmissionController {
    /// Controller with no relaunch delay: a finished flow's slot is reused
    /// immediately, so a 1s run at 2 users with 100ms flows launches about
    /// 20 flows. Use [`with_relaunch_delay`](Self::with_relaunch_delay) (or
    /// [`from_config`](Self::from_config), 50ms by default) to space out
    /// relaunches; a 100ms delay gives about 10 flows in the same run.
    pub fn new(duration: Duration, target_concurrency: usize) -> Self {
        Self {
            duration,
            target_concurrency,
            relaunch_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &LoadTestConfig) -> Self {
        Self::new(config.duration(), config.run.concurrency)
            .with_relaunch_delay(config.relaunch_delay())
    }

    /// Hold a finished flow's slot this long before it can be reused
    pub fn with_relaunch_delay(mut self, delay: Duration) -> Self {
        self.relaunch_delay = delay;
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn target_concurrency(&self) -> usize {
        self.target_concurrency
    }

    /// Run flows until the deadline and return every result
    pub async fn run<F>(&self, flow: Arc<F>) -> Vec<FlowResult>
    where
        F: UserFlow + ?Sized + 'static,
    {
        let state = Arc::new(RunState::new(self.target_concurrency));
        self.run_with_state(flow, state).await
    }

    /// Run flows against a caller-supplied [`RunState`]
    pub async fn run_with_state<F>(&self, flow: Arc<F>, state: Arc<RunState>) -> Vec<FlowResult>
    where
        F: UserFlow + ?Sized + 'static,
    {
        if self.duration.is_zero() || self.target_concurrency == 0 || state.ceiling() == 0 {
            info!("Nothing to run: duration or concurrency is zero");
            return Vec::new();
        }

        info!(
            "Starting load test for {:.1}s with {} concurrent users",
            self.duration.as_secs_f64(),
            self.target_concurrency
        );

        let deadline = Instant::now() + self.duration;
        let capacity = self.target_concurrency.min(state.ceiling());
        let semaphore = Arc::new(Semaphore::new(capacity));
        let mut tasks = JoinSet::new();

        loop {
            let permit = tokio::select! {
                biased;
                _ = sleep_until(deadline) => break,
                Some(joined) = tasks.join_next() => {
                    reap(joined);
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            if Instant::now() >= deadline {
                break;
            }

            let Some(user_id) = state.try_admit() else {
                // A shared RunState can be full while we still hold a permit
                drop(permit);
                debug!("[Orchestrator] No free slot in run state; waiting");
                tokio::select! {
                    biased;
                    _ = sleep_until(deadline) => break,
                    Some(joined) = tasks.join_next() => reap(joined),
                    _ = sleep(ADMISSION_RETRY) => {}
                }
                continue;
            };
            debug!(
                "[Orchestrator] Starting user {}. Active flows: {}",
                user_id,
                state.active()
            );

            tasks.spawn(run_flow(
                flow.clone(),
                state.clone(),
                user_id,
                permit,
                deadline,
                self.relaunch_delay,
            ));
        }

        info!(
            "Deadline reached after {} launches; draining {} in-flight flows",
            state.launched(),
            state.active()
        );

        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }

        debug_assert_eq!(state.active(), 0);
        info!("All {} flows finished", state.completed());

        state.take_results()
    }
}

async fn run_flow<F>(
    flow: Arc<F>,
    state: Arc<RunState>,
    user_id: u64,
    permit: OwnedSemaphorePermit,
    deadline: Instant,
    relaunch_delay: Duration,
) where
    F: UserFlow + ?Sized + 'static,
{
    let clock = FlowClock::start();
    let outcome = AssertUnwindSafe(flow.execute(user_id)).catch_unwind().await;

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!("[Orchestrator] User {} failed unexpectedly: {}", user_id, e);
            FlowResult::failed(user_id, clock, e.to_string())
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!("[Orchestrator] User {} panicked: {}", user_id, reason);
            FlowResult::failed(user_id, clock, format!("flow panicked: {}", reason))
        }
    };

    let success = result.success;
    let active = state.complete(result);
    debug!(
        "[Orchestrator] User {} finished. Success: {}. Active flows: {}",
        user_id, success, active
    );

    // The slot stays taken for the relaunch delay, but never past the deadline
    if !relaunch_delay.is_zero() {
        sleep_until((Instant::now() + relaunch_delay).min(deadline)).await;
    }
    drop(permit);
}

fn reap(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!("Flow task did not complete: {}", e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
