//! Virtual-clock scheduler for deterministic tests.

use composable_effects_core::error::SchedulerError;
use composable_effects_core::scheduler::{
    self, OnceAction, RepeatingAction, Scheduler, SchedulerConfig, TimerQueue,
};
use composable_effects_core::subscription::Subscription;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

struct Inner {
    queue: Arc<Mutex<TimerQueue>>,
    now: Mutex<Duration>,
    config: SchedulerConfig,
    fired: AtomicU64,
}

/// A scheduler whose clock only moves when the test says so.
///
/// Time starts at zero. [`advance`](Self::advance) runs every callback due in
/// the advanced interval, in fire-time order with registration order breaking
/// ties, and returns once all of them (and anything they scheduled inside the
/// interval) have run. Callbacks execute synchronously on the calling thread.
///
/// # Example
///
/// ```
/// use composable_effects_core::scheduler::Scheduler;
/// use composable_effects_testing::TestScheduler;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// let scheduler = TestScheduler::new();
/// let fired = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&fired);
/// let _token = scheduler.schedule_repeating(
///     Duration::from_secs(1),
///     Box::new(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }),
/// );
///
/// scheduler.advance(Duration::from_secs(3));
/// assert_eq!(fired.load(Ordering::SeqCst), 3);
/// assert_eq!(scheduler.now(), Duration::from_secs(3));
/// ```
#[derive(Clone)]
pub struct TestScheduler {
    inner: Arc<Inner>,
}

impl TestScheduler {
    /// Create a scheduler at time zero with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler at time zero.
    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Arc::new(Mutex::new(TimerQueue::new())),
                now: Mutex::new(Duration::ZERO),
                config,
                fired: AtomicU64::new(0),
            }),
        }
    }

    /// Move the clock forward by `duration`, running everything due.
    pub fn advance(&self, duration: Duration) {
        let target = self.now().saturating_add(duration);
        self.advance_to(target);
    }

    /// Move the clock to `instant`, running everything due.
    ///
    /// Moving to a time in the past does nothing.
    pub fn advance_to(&self, instant: Duration) {
        while self.step(Some(instant)) {}

        let mut now = self.lock_now();
        if instant > *now {
            *now = instant;
        }
    }

    /// Run until nothing is scheduled.
    ///
    /// Never returns while repeating work is still live. Cancel every
    /// timer first, or use [`run_with_limit`](Self::run_with_limit).
    pub fn run(&self) {
        while self.step(None) {}
    }

    /// Run until nothing is scheduled or `limit` callbacks have fired.
    ///
    /// Returns the number of callbacks fired.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::RunLimitExceeded`] if work remains after
    /// `limit` callbacks.
    pub fn run_with_limit(&self, limit: usize) -> Result<usize, SchedulerError> {
        let mut fired = 0;
        while fired < limit {
            if !self.step(None) {
                return Ok(fired);
            }
            fired += 1;
        }

        let pending = self.pending();
        if pending == 0 {
            return Ok(fired);
        }

        tracing::warn!(limit, pending, "Virtual run stopped with work still scheduled");
        Err(SchedulerError::RunLimitExceeded { limit, pending })
    }

    /// Number of live scheduled callbacks.
    #[must_use]
    pub fn pending(&self) -> usize {
        scheduler::lock(&self.inner.queue).len()
    }

    /// Total callbacks fired since creation.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Fire the next callback due by `until`, or the next one at all.
    fn step(&self, until: Option<Duration>) -> bool {
        let due = {
            let mut queue = scheduler::lock(&self.inner.queue);
            match until {
                Some(instant) => queue.pop_due(instant),
                None => queue.pop_next(),
            }
        };

        let Some(due) = due else {
            return false;
        };

        {
            let mut now = self.lock_now();
            if due.fire_at() > *now {
                *now = due.fire_at();
            }
        }

        tracing::trace!(at = ?due.fire_at(), "Firing virtual callback");
        due.run(&self.inner.queue);
        self.inner.fired.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn lock_now(&self) -> std::sync::MutexGuard<'_, Duration> {
        self.inner.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TestScheduler {
    fn now(&self) -> Duration {
        *self.lock_now()
    }

    fn schedule_once(&self, delay: Duration, action: OnceAction) -> Subscription {
        let fire_at = self.now().saturating_add(delay);
        let task = scheduler::lock(&self.inner.queue).insert_once(fire_at, action);
        TimerQueue::token(&self.inner.queue, task)
    }

    fn schedule_repeating(&self, period: Duration, action: RepeatingAction) -> Subscription {
        let period = self.inner.config.period(period);
        let first = self.now().saturating_add(period);
        let task = scheduler::lock(&self.inner.queue).insert_repeating(first, period, action);
        TimerQueue::token(&self.inner.queue, task)
    }
}

impl fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .field("fired", &self.fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn log_action(log: &Arc<Mutex<Vec<(String, Duration)>>>, scheduler: &TestScheduler, label: &str) -> OnceAction {
        let log = Arc::clone(log);
        let scheduler = scheduler.clone();
        let label = label.to_string();
        Box::new(move || {
            log.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((label, scheduler.now()));
        })
    }

    #[test]
    fn test_advance_fires_in_time_then_registration_order() {
        let scheduler = TestScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _b = scheduler.schedule_once(secs(2), log_action(&log, &scheduler, "b"));
        let _a = scheduler.schedule_once(secs(1), log_action(&log, &scheduler, "a"));
        let _c = scheduler.schedule_once(secs(2), log_action(&log, &scheduler, "c"));

        scheduler.advance(secs(2));

        let log = log.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(
            log,
            vec![
                ("a".to_string(), secs(1)),
                ("b".to_string(), secs(2)),
                ("c".to_string(), secs(2)),
            ]
        );
    }

    #[test]
    fn test_nothing_fires_before_its_time() {
        let scheduler = TestScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _token = scheduler.schedule_once(secs(3), log_action(&log, &scheduler, "x"));

        scheduler.advance(secs(2));
        assert!(log.lock().unwrap_or_else(PoisonError::into_inner).is_empty());
        assert_eq!(scheduler.now(), secs(2));

        scheduler.advance(secs(1));
        assert_eq!(log.lock().unwrap_or_else(PoisonError::into_inner).len(), 1);
    }

    #[test]
    fn test_callback_scheduled_inside_interval_also_fires() {
        let scheduler = TestScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let inner_scheduler = scheduler.clone();
        let counter = Arc::clone(&fired);

        let _token = scheduler.schedule_once(
            secs(1),
            Box::new(move || {
                let counter = Arc::clone(&counter);
                let _nested = inner_scheduler.schedule_once(
                    secs(1),
                    Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        scheduler.advance(secs(2));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disposed_token_never_fires() {
        let scheduler = TestScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let token = scheduler.schedule_once(secs(1), log_action(&log, &scheduler, "x"));

        token.dispose();
        scheduler.run();

        assert!(log.lock().unwrap_or_else(PoisonError::into_inner).is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_run_moves_clock_to_last_callback() {
        let scheduler = TestScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _token = scheduler.schedule_once(secs(31), log_action(&log, &scheduler, "late"));

        scheduler.run();

        assert_eq!(scheduler.now(), secs(31));
        assert_eq!(scheduler.fired(), 1);
    }

    #[test]
    fn test_run_with_limit_reports_runaway_work() {
        let scheduler = TestScheduler::new();
        let _token = scheduler.schedule_repeating(secs(1), Box::new(|| {}));

        let result = scheduler.run_with_limit(10);

        assert_eq!(
            result,
            Err(SchedulerError::RunLimitExceeded {
                limit: 10,
                pending: 1
            })
        );
        assert_eq!(scheduler.now(), secs(10));
    }

    #[test]
    fn test_run_with_limit_returns_fired_count() {
        let scheduler = TestScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = scheduler.schedule_once(secs(1), log_action(&log, &scheduler, "a"));
        let _b = scheduler.schedule_once(secs(2), log_action(&log, &scheduler, "b"));

        assert_eq!(scheduler.run_with_limit(10), Ok(2));
    }

    #[test]
    fn test_zero_period_is_rounded_up() {
        let scheduler = TestScheduler::with_config(SchedulerConfig::new(Duration::from_millis(10)));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let token = scheduler.schedule_repeating(
            Duration::ZERO,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        scheduler.advance(Duration::from_millis(100));
        token.dispose();

        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_unbounded_delay_stays_pending() {
        let scheduler = TestScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        scheduler.advance(secs(1));
        let _token = scheduler.schedule_once(Duration::MAX, log_action(&log, &scheduler, "never"));

        scheduler.advance(secs(3600));

        assert!(log.lock().unwrap_or_else(PoisonError::into_inner).is_empty());
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_unbounded_period_clamps_at_end_of_time() {
        let scheduler = TestScheduler::new();
        scheduler.advance(secs(1));
        let _token = scheduler.schedule_repeating(Duration::MAX, Box::new(|| {}));

        let result = scheduler.run_with_limit(2);

        assert_eq!(
            result,
            Err(SchedulerError::RunLimitExceeded {
                limit: 2,
                pending: 1
            })
        );
        assert_eq!(scheduler.now(), Duration::MAX);
    }

    #[test]
    fn test_advance_to_past_is_noop() {
        let scheduler = TestScheduler::new();
        scheduler.advance(secs(5));
        scheduler.advance_to(secs(2));
        assert_eq!(scheduler.now(), secs(5));
    }
}
