//! Wall-clock scheduler backed by tokio.
//!
//! A [`TokioScheduler`] owns one worker task that drives a shared
//! [`TimerQueue`] against `tokio::time`. Callbacks run on that worker, one at
//! a time, in the same `(fire time, registration order)` order the virtual
//! scheduler uses. Scheduling from any thread wakes the worker so an earlier
//! deadline is never missed.

use composable_effects_core::error::SchedulerError;
use composable_effects_core::scheduler::{
    self, OnceAction, RepeatingAction, Scheduler, SchedulerConfig, TimerQueue,
};
use composable_effects_core::subscription::Subscription;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;

struct Shared {
    queue: Arc<Mutex<TimerQueue>>,
    origin: Instant,
    config: SchedulerConfig,
    wake: Notify,
    stopped: AtomicBool,
}

impl Shared {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            tracing::debug!("Stopping scheduler worker");
            self.wake.notify_one();
        }

        // Callbacks may own scheduler handles; drop them after the lock is released.
        let discarded = std::mem::replace(&mut *scheduler::lock(&self.queue), TimerQueue::new());
        drop(discarded);
    }
}

/// Stops the worker once the last scheduler handle is dropped.
struct WorkerGuard {
    shared: Arc<Shared>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

/// Production scheduler running callbacks on a dedicated tokio task.
///
/// Cloning yields another handle to the same worker and clock. The worker
/// exits on [`shutdown`](Self::shutdown) or when every handle is dropped;
/// pending callbacks are then discarded.
///
/// A pending callback that captures a handle, as `deferred` and `timer`
/// effects do, keeps the worker running until it fires or is cancelled.
/// Call [`shutdown`](Self::shutdown) to stop such work without cancelling
/// each subscription.
///
/// # Example
///
/// ```no_run
/// use composable_effects_core::{Effect, Never, Tick};
/// use composable_effects_runtime::TokioScheduler;
/// use std::time::Duration;
///
/// #[derive(Debug, Hash, PartialEq, Eq)]
/// struct Heartbeat;
///
/// # async fn example() -> Result<(), composable_effects_core::SchedulerError> {
/// let scheduler = TokioScheduler::new()?;
/// let _ticks = Effect::<Tick, Never>::timer(Heartbeat, Duration::from_secs(1), &scheduler)
///     .subscribe_next(|tick| println!("tick {tick}"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TokioScheduler {
    shared: Arc<Shared>,
    _guard: Arc<WorkerGuard>,
}

impl TokioScheduler {
    /// Start a scheduler on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] when called outside a tokio
    /// runtime.
    pub fn new() -> Result<Self, SchedulerError> {
        Self::with_config(SchedulerConfig::default())
    }

    /// Start a scheduler with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] when called outside a tokio
    /// runtime.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;
        Ok(Self::spawn_on(&handle, config))
    }

    /// Start a scheduler whose worker runs on `handle`.
    #[must_use]
    pub fn spawn_on(handle: &Handle, config: SchedulerConfig) -> Self {
        let shared = Arc::new(Shared {
            queue: Arc::new(Mutex::new(TimerQueue::new())),
            origin: Instant::now(),
            config,
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
        });

        handle.spawn(drive(Arc::clone(&shared)));
        tracing::debug!(resolution = ?config.resolution, "Scheduler worker started");

        Self {
            _guard: Arc::new(WorkerGuard {
                shared: Arc::clone(&shared),
            }),
            shared,
        }
    }

    /// Stop the worker. Pending callbacks never fire.
    ///
    /// Scheduling after shutdown returns an already disposed token.
    pub fn shutdown(&self) {
        self.shared.stop();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Number of live scheduled callbacks.
    #[must_use]
    pub fn pending(&self) -> usize {
        scheduler::lock(&self.shared.queue).len()
    }

    fn enqueue<F>(&self, insert: F) -> Subscription
    where
        F: FnOnce(&mut TimerQueue) -> scheduler::TaskId,
    {
        if self.is_shutdown() {
            tracing::warn!("Callback scheduled after shutdown, ignoring");
            return Subscription::disposed();
        }

        let task = insert(&mut scheduler::lock(&self.shared.queue));
        self.shared.wake.notify_one();
        TimerQueue::token(&self.shared.queue, task)
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.shared.elapsed()
    }

    fn schedule_once(&self, delay: Duration, action: OnceAction) -> Subscription {
        let fire_at = self.now().saturating_add(delay);
        self.enqueue(|queue| queue.insert_once(fire_at, action))
    }

    fn schedule_repeating(&self, period: Duration, action: RepeatingAction) -> Subscription {
        let period = self.shared.config.period(period);
        let first = self.now().saturating_add(period);
        self.enqueue(|queue| queue.insert_repeating(first, period, action))
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .field("stopped", &self.is_shutdown())
            .finish()
    }
}

async fn drive(shared: Arc<Shared>) {
    loop {
        if shared.stopped.load(Ordering::Acquire) {
            break;
        }

        loop {
            let due = scheduler::lock(&shared.queue).pop_due(shared.elapsed());
            let Some(due) = due else {
                break;
            };
            tracing::trace!(at = ?due.fire_at(), "Firing scheduled callback");
            due.run(&shared.queue);
        }

        // Deadlines past what `Instant` can represent never arrive.
        let deadline = scheduler::lock(&shared.queue)
            .next_deadline()
            .and_then(|at| shared.origin.checked_add(at));
        match deadline {
            Some(at) => {
                tokio::select! {
                    () = tokio::time::sleep_until(at) => {},
                    () = shared.wake.notified() => {},
                }
            },
            None => shared.wake.notified().await,
        }
    }

    tracing::debug!("Scheduler worker exited");
}
