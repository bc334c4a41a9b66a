//! Restartable periodic background task
//!
//! Each tick runs as a tokio task that sleeps for the interval, re-arms the
//! next tick under the lock, and only then runs the action outside the lock.
//! A slow or failing action therefore never stops later ticks, and `stop()`
//! never waits for a running action.
//!
//! Must be started from within a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use log::trace;
use tokio::task::JoinHandle;

/// Action run on every tick
pub type TimerAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Repeating timer with start/stop/reset
pub struct PeriodicTimer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    interval: Duration,
    action: TimerAction,
    state: Mutex<TimerState>,
}

struct TimerState {
    stopped: bool,
    pending: Option<JoinHandle<()>>,
    /// Bumped on every arm so a tick that lost a race with reset() can tell
    generation: u64,
}

impl PeriodicTimer {
    /// Create a timer. With `autostart` the first tick is scheduled immediately.
    pub fn new(interval: Duration, action: TimerAction, autostart: bool) -> Self {
        let timer = Self {
            inner: Arc::new(TimerInner {
                interval,
                action,
                state: Mutex::new(TimerState {
                    stopped: true,
                    pending: None,
                    generation: 0,
                }),
            }),
        };
        if autostart {
            timer.start();
        }
        timer
    }

    /// Schedule the first tick. No-op if already running.
    pub fn start(&self) {
        let mut state = self.inner.lock();
        if !state.stopped {
            return;
        }
        state.stopped = false;
        arm(&self.inner, &mut state);
    }

    /// Cancel the pending tick. An action already running finishes but does not re-arm.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        state.stopped = true;
        state.generation += 1;
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
    }

    /// Push the next tick a full interval into the future. No-op if stopped.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        if state.stopped {
            return;
        }
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
        arm(&self.inner, &mut state);
    }

    pub fn is_running(&self) -> bool {
        !self.inner.lock().stopped
    }
}

impl TimerInner {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        // The state is plain data; a panic elsewhere cannot leave it inconsistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for TimerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
    }
}

/// Spawn the next tick. Caller holds the lock.
fn arm(inner: &Arc<TimerInner>, state: &mut TimerState) {
    state.generation += 1;
    let generation = state.generation;
    let interval = inner.interval;
    let weak: Weak<TimerInner> = Arc::downgrade(inner);

    state.pending = Some(tokio::spawn(async move {
        tokio::time::sleep(interval).await;
        if let Some(inner) = weak.upgrade() {
            fire(inner, generation).await;
        }
    }));
}

async fn fire(inner: Arc<TimerInner>, generation: u64) {
    {
        let mut state = inner.lock();
        if state.stopped || state.generation != generation {
            trace!("Dropping stale timer tick");
            return;
        }
        // Detach our own handle before re-arming so it is not aborted later
        state.pending = None;
        arm(&inner, &mut state);
    }

    let action = Arc::clone(&inner.action);
    drop(inner);
    action().await;
}
