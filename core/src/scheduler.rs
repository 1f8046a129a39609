//! Time sources and the ordered timer queue behind them.
//!
//! Effects never touch a clock directly. They receive a [`Scheduler`] and ask
//! it for one-shot or repeating callbacks, so the same effect runs against
//! wall-clock time in production and against a manually advanced virtual
//! clock in tests.
//!
//! Both kinds of scheduler drive a [`TimerQueue`]: a min-heap keyed by
//! `(fire_at, sequence)`. The sequence number is assigned on every insertion,
//! which makes callbacks due at the same instant fire in registration order.

use crate::subscription::Subscription;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One-shot callback.
pub type OnceAction = Box<dyn FnOnce() + Send>;

/// Repeating callback.
pub type RepeatingAction = Box<dyn FnMut() + Send>;

/// A source of time that runs callbacks in time order.
///
/// Time points are measured as the [`Duration`] elapsed since the scheduler
/// was created. The returned [`Subscription`] is the cancellation token for
/// the scheduled work; disposing it guarantees the callback will not start
/// again, although an invocation already running completes.
pub trait Scheduler: Send + Sync {
    /// Current time point.
    fn now(&self) -> Duration;

    /// Run `action` once, when time reaches `now() + delay`.
    fn schedule_once(&self, delay: Duration, action: OnceAction) -> Subscription;

    /// Run `action` at `now() + period` and every `period` after that, until
    /// the returned subscription is disposed.
    fn schedule_repeating(&self, period: Duration, action: RepeatingAction) -> Subscription;
}

impl<S> Scheduler for Arc<S>
where
    S: Scheduler + ?Sized,
{
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn schedule_once(&self, delay: Duration, action: OnceAction) -> Subscription {
        (**self).schedule_once(delay, action)
    }

    fn schedule_repeating(&self, period: Duration, action: RepeatingAction) -> Subscription {
        (**self).schedule_repeating(period, action)
    }
}

/// Configuration shared by scheduler implementations.
///
/// # Example
///
/// ```
/// use composable_effects_core::scheduler::SchedulerConfig;
/// use std::time::Duration;
///
/// let config = SchedulerConfig::default().with_resolution(Duration::from_millis(5));
/// assert_eq!(config.period(Duration::ZERO), Duration::from_millis(5));
/// assert_eq!(config.period(Duration::from_secs(1)), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Smallest period a repeating callback may use.
    ///
    /// Shorter periods (including zero) are rounded up so repeating work
    /// always moves time forward.
    pub resolution: Duration,
}

impl SchedulerConfig {
    /// Create a configuration with the given resolution.
    #[must_use]
    pub const fn new(resolution: Duration) -> Self {
        Self { resolution }
    }

    /// Set the resolution.
    #[must_use]
    pub const fn with_resolution(mut self, resolution: Duration) -> Self {
        self.resolution = resolution;
        self
    }

    /// Effective period for a requested one.
    #[must_use]
    pub fn period(&self, requested: Duration) -> Duration {
        let floor = if self.resolution.is_zero() {
            Duration::from_nanos(1)
        } else {
            self.resolution
        };
        requested.max(floor)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            resolution: Duration::from_millis(1),
        }
    }
}

/// Identity of a scheduled callback within one [`TimerQueue`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

enum Job {
    Once(OnceAction),
    Repeating {
        period: Duration,
        action: RepeatingAction,
    },
}

struct Entry {
    fire_at: Duration,
    sequence: u64,
    task: TaskId,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.sequence == other.sequence
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap: earliest time first, then lowest sequence
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A callback popped from the queue, ready to run.
pub struct DueJob {
    task: TaskId,
    fire_at: Duration,
    job: Job,
}

impl DueJob {
    /// Scheduled fire time of this callback.
    #[must_use]
    pub const fn fire_at(&self) -> Duration {
        self.fire_at
    }

    /// Run the callback without holding the queue lock.
    ///
    /// Repeating work is re-armed at `fire_at + period` afterwards, unless it
    /// was cancelled while it ran.
    pub fn run(self, queue: &Mutex<TimerQueue>) {
        metrics::counter!("scheduler_callbacks_fired_total").increment(1);
        match self.job {
            Job::Once(action) => action(),
            Job::Repeating { period, mut action } => {
                action();
                let mut queue = lock(queue);
                if queue.live.contains(&self.task) {
                    queue.push(
                        self.task,
                        self.fire_at.saturating_add(period),
                        Job::Repeating { period, action },
                    );
                }
            },
        }
    }
}

impl fmt::Debug for DueJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DueJob")
            .field("task", &self.task)
            .field("fire_at", &self.fire_at)
            .finish_non_exhaustive()
    }
}

/// Pending callbacks ordered by `(fire_at, sequence)`.
///
/// The queue does not know what time it is; callers pass the current time to
/// [`pop_due`](Self::pop_due). Cancelled entries are removed eagerly so that
/// the closures they own are dropped right away.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Entry>,
    live: HashSet<TaskId>,
    next_sequence: u64,
    next_task: u64,
}

impl TimerQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a one-shot callback at `fire_at`.
    pub fn insert_once(&mut self, fire_at: Duration, action: OnceAction) -> TaskId {
        let task = self.allocate();
        self.push(task, fire_at, Job::Once(action));
        task
    }

    /// Schedule a repeating callback first firing at `first_fire_at`.
    pub fn insert_repeating(
        &mut self,
        first_fire_at: Duration,
        period: Duration,
        action: RepeatingAction,
    ) -> TaskId {
        let task = self.allocate();
        self.push(task, first_fire_at, Job::Repeating { period, action });
        task
    }

    /// Cancel a scheduled callback. Returns whether it was still live.
    pub fn cancel(&mut self, task: TaskId) -> bool {
        if self.live.remove(&task) {
            self.heap.retain(|entry| entry.task != task);
            true
        } else {
            false
        }
    }

    /// Fire time of the earliest pending callback.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.heap.peek().map(|entry| entry.fire_at)
    }

    /// Pop the earliest callback if it is due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<DueJob> {
        if self.next_deadline()? > now {
            return None;
        }
        self.pop_next()
    }

    /// Pop the earliest callback regardless of time.
    pub fn pop_next(&mut self) -> Option<DueJob> {
        let entry = self.heap.pop()?;
        if matches!(entry.job, Job::Once(_)) {
            self.live.remove(&entry.task);
        }
        Some(DueJob {
            task: entry.task,
            fire_at: entry.fire_at,
            job: entry.job,
        })
    }

    /// Number of live callbacks, including a repeating one currently running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Drop every pending callback.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    /// Cancellation token for `task` that holds the queue weakly.
    #[must_use]
    pub fn token(queue: &Arc<Mutex<Self>>, task: TaskId) -> Subscription {
        let queue = Arc::downgrade(queue);
        Subscription::with_teardown(move || {
            if let Some(queue) = queue.upgrade() {
                if lock(&queue).cancel(task) {
                    tracing::trace!(?task, "Cancelled scheduled callback");
                }
            }
        })
    }

    fn allocate(&mut self) -> TaskId {
        let task = TaskId(self.next_task);
        self.next_task += 1;
        self.live.insert(task);
        task
    }

    fn push(&mut self, task: TaskId, fire_at: Duration, job: Job) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Entry {
            fire_at,
            sequence,
            task,
            job,
        });
    }
}

impl fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerQueue")
            .field("live", &self.live.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

/// Lock a queue, recovering from poisoning.
pub fn lock(queue: &Mutex<TimerQueue>) -> MutexGuard<'_, TimerQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}
