//! Core coalescing limiter implementation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::handler::Handler;
use super::sink::{ErrorSink, LogSink};
use crate::error::{HandlerError, Result};

/// Observable state of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterState {
    /// No pending change and no handler running
    Idle,
    /// A change is waiting for the cooldown to elapse
    PendingCooldown,
    /// The handler is running and nothing new arrived
    Running,
    /// The handler is running and a change arrived after it started
    PendingWhileRunning,
}

/// Monotonic counters describing limiter activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterStats {
    /// Calls to `register_change`
    pub changes: u64,
    /// Handler runs dispatched
    pub runs: u64,
    /// Handler runs that returned an error or panicked
    pub failures: u64,
    /// Deferred runs scheduled while cooling down
    pub deferred: u64,
}

/// Why the change worker is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Change,
    Timer,
    Completed,
}

/// Mutable limiter state, only touched while holding `Inner::state`.
#[derive(Default)]
struct State {
    last_start: Option<Instant>,
    pending_since: Option<Instant>,
    running: bool,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    interval: Duration,
    handler: Arc<dyn Handler>,
    sink: Arc<dyn ErrorSink>,
    runtime: Handle,
    state: Mutex<State>,
    changes: AtomicU64,
    runs: AtomicU64,
    failures: AtomicU64,
    deferred: AtomicU64,
}

/// Serializes and throttles runs of a [`Handler`] in response to change signals.
///
/// Any number of [`register_change`](Self::register_change) calls made while
/// the handler is running or cooling down collapse into a single follow-up
/// run. Runs never overlap, and the starts of two consecutive runs are at
/// least `interval` apart.
///
/// For a burst of calls the handler runs at most once on the leading edge
/// (only when the limiter was idle with its cooldown satisfied) and exactly
/// once more on the trailing edge, covering every remaining call.
///
/// The limiter is a cheap handle; clones drive the same state.
#[derive(Clone)]
pub struct CoalescingLimiter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CoalescingLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingLimiter")
            .field("interval", &self.inner.interval)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

impl CoalescingLimiter {
    /// Create a limiter on the current tokio runtime, reporting handler
    /// failures through [`LogSink`].
    pub fn new<H: Handler>(interval: Duration, handler: H) -> Result<Self> {
        Self::with_sink(interval, handler, LogSink)
    }

    /// Create a limiter on the current tokio runtime with a custom error sink.
    pub fn with_sink<H, S>(interval: Duration, handler: H, sink: S) -> Result<Self>
    where
        H: Handler,
        S: ErrorSink,
    {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(runtime, interval, handler, sink))
    }

    /// Create a limiter that spawns its work on `runtime`.
    ///
    /// `register_change` on such a limiter may be called from any thread,
    /// including ones outside the runtime.
    pub fn with_runtime<H, S>(runtime: Handle, interval: Duration, handler: H, sink: S) -> Self
    where
        H: Handler,
        S: ErrorSink,
    {
        Self {
            inner: Arc::new(Inner {
                interval,
                handler: Arc::new(handler),
                sink: Arc::new(sink),
                runtime,
                state: Mutex::new(State::default()),
                changes: AtomicU64::new(0),
                runs: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                deferred: AtomicU64::new(0),
            }),
        }
    }

    /// Record that the handler should run to pick up a change.
    ///
    /// Returns immediately. There is no guarantee of one run per call, only
    /// that a run starts after this call once the interval allows it.
    pub fn register_change(&self) {
        self.inner.changes.fetch_add(1, Ordering::SeqCst);
        self.inner.change_worker(Trigger::Change);
    }

    /// Minimum spacing between the starts of consecutive runs.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Current state of the limiter.
    pub fn state(&self) -> LimiterState {
        let state = self.inner.state.lock();
        match (state.running, state.pending_since.is_some()) {
            (true, true) => LimiterState::PendingWhileRunning,
            (true, false) => LimiterState::Running,
            (false, true) => LimiterState::PendingCooldown,
            (false, false) => LimiterState::Idle,
        }
    }

    /// Activity counters.
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            changes: self.inner.changes.load(Ordering::SeqCst),
            runs: self.inner.runs.load(Ordering::SeqCst),
            failures: self.inner.failures.load(Ordering::SeqCst),
            deferred: self.inner.deferred.load(Ordering::SeqCst),
        }
    }
}

impl Inner {
    /// Re-evaluate pending work. Every entry point funnels through here.
    fn change_worker(self: &Arc<Self>, trigger: Trigger) {
        let mut state = self.state.lock();
        let now = Instant::now();

        if trigger == Trigger::Timer {
            state.timer = None;
        }

        if trigger == Trigger::Change && state.pending_since.is_none() {
            state.pending_since = Some(now);
        }

        if state.running {
            trace!(?trigger, "Handler running, change left pending");
            return;
        }

        let Some(pending_since) = state.pending_since else {
            return;
        };

        let remaining = match state.last_start {
            Some(last_start) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last_start)),
            None => Duration::ZERO,
        };

        if !remaining.is_zero() {
            // The deadline only moves when a run starts, so a live timer is still correct.
            if state.timer.as_ref().is_some_and(|timer| !timer.is_finished()) {
                trace!(?trigger, "Deferred run already scheduled");
                return;
            }

            debug!(
                ?trigger,
                remaining_ms = remaining.as_millis() as u64,
                "Cooldown active, scheduling deferred run"
            );
            self.deferred.fetch_add(1, Ordering::SeqCst);
            let weak = Arc::downgrade(self);
            state.timer = Some(self.runtime.spawn(async move {
                tokio::time::sleep(remaining).await;
                if let Some(inner) = weak.upgrade() {
                    inner.change_worker(Trigger::Timer);
                }
            }));
            return;
        }

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        state.running = true;
        state.pending_since = None;
        state.last_start = Some(now);
        drop(state);

        self.dispatch(trigger, now.saturating_duration_since(pending_since));
    }

    /// Run the handler on its own task, then clear `running` and re-evaluate.
    fn dispatch(self: &Arc<Self>, trigger: Trigger, waited: Duration) {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            run = run,
            ?trigger,
            waited_ms = waited.as_millis() as u64,
            "Dispatching handler"
        );

        let guard = RunGuard {
            inner: Arc::clone(self),
        };
        self.runtime.spawn(async move {
            let inner = &guard.inner;
            let result = match AssertUnwindSafe(inner.handler.handle()).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
            };

            match result {
                Ok(()) => trace!(run = run, "Handler run completed"),
                Err(err) => {
                    inner.failures.fetch_add(1, Ordering::SeqCst);
                    let reported =
                        std::panic::catch_unwind(AssertUnwindSafe(|| inner.sink.report(&err)));
                    if let Err(panic) = reported {
                        warn!(
                            run = run,
                            error = %err,
                            panic = %panic_message(panic.as_ref()),
                            "Error sink panicked while reporting handler failure"
                        );
                    }
                }
            }
        });
    }
}

/// Ends a handler run when dropped, including on unwind or task abort.
struct RunGuard {
    inner: Arc<Inner>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.state.lock().running = false;
        self.inner.change_worker(Trigger::Completed);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
