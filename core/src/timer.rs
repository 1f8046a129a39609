//! Periodic tick effects.

use crate::effect::Effect;
use crate::scheduler::Scheduler;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

/// Counter carried by each timer emission, starting at 1.
pub type Tick = u64;

impl<E> Effect<Tick, E>
where
    E: Send + 'static,
{
    /// A timer that emits `1, 2, 3, ...` every `period` on `scheduler`.
    ///
    /// Each subscription registers under `id`, schedules its own repeating
    /// callback and keeps its own counter. The timer never completes by
    /// itself: it stops when disposed, for instance through
    /// [`Effect::cancel`] with an equal id or a downstream [`Effect::take`].
    /// Several timers may share one id and are then cancelled together.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let scheduler = TestScheduler::new();
    /// let ticks = Effect::<Tick, Never>::timer(TimerId, Duration::from_secs(1), &scheduler);
    /// ticks.subscribe_next(|tick| println!("tick {tick}"));
    /// scheduler.advance(Duration::from_secs(3)); // prints ticks 1, 2 and 3
    /// ```
    pub fn timer<K, S>(id: K, period: Duration, scheduler: &S) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
        S: Scheduler + Clone + 'static,
    {
        let scheduler = scheduler.clone();
        Self::new(move |subscriber| {
            let downstream = subscriber.clone();
            let mut count: Tick = 0;
            let task = scheduler.schedule_repeating(
                period,
                Box::new(move || {
                    count += 1;
                    downstream.emit(count);
                }),
            );
            tracing::trace!(?period, "Timer started");
            subscriber.subscription().attach(task);
        })
        .cancellable(id)
    }
}
